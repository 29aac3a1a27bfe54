use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::Location;

/// Positions on the progress bar; the last one is never reached by the form itself.
pub const TOTAL_STEPS: u8 = 7;

pub const SERVICE_OPENS_AT: u32 = 7;
pub const SERVICE_CLOSES_AT: u32 = 17;

pub fn within_service_window(time: NaiveTime) -> bool {
    let seconds = time.num_seconds_from_midnight();
    seconds >= SERVICE_OPENS_AT * 3600 && seconds <= SERVICE_CLOSES_AT * 3600
}

// Steps of the booking form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    Category = 1,
    Title,
    Description,
    Location,
    Schedule,
    Recurrence,
}

impl WizardStep {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<WizardStep> {
        match self {
            WizardStep::Category => Some(WizardStep::Title),
            WizardStep::Title => Some(WizardStep::Description),
            WizardStep::Description => Some(WizardStep::Location),
            WizardStep::Location => Some(WizardStep::Schedule),
            WizardStep::Schedule => Some(WizardStep::Recurrence),
            WizardStep::Recurrence => None,
        }
    }

    /// Time the completion checkmark stays on screen before the next section shows up.
    pub fn pacing_delay(self) -> Duration {
        match self {
            WizardStep::Location => Duration::from_millis(500),
            _ => Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCategory {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recurrence {
    #[default]
    OneTime,
    Recurring,
}

impl Recurrence {
    pub fn label(self) -> &'static str {
        match self {
            Recurrence::OneTime => "One-Time Service",
            Recurrence::Recurring => "Recurring Service",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingDraft {
    pub category: Option<SelectedCategory>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<Location>,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time: Option<NaiveTime>,
    pub recurrence: Recurrence,
    pub selected_days: Vec<Weekday>,
}

impl BookingDraft {
    pub fn is_complete(&self, step: WizardStep) -> bool {
        match step {
            WizardStep::Category => self.category.is_some(),
            WizardStep::Title => self.title.is_some(),
            WizardStep::Description => self.description.is_some(),
            WizardStep::Location => self.location.is_some(),
            WizardStep::Schedule => self.preferred_date.is_some() && self.preferred_time.is_some(),
            WizardStep::Recurrence => {
                self.recurrence == Recurrence::OneTime || !self.selected_days.is_empty()
            }
        }
    }

    pub fn toggle_day(&mut self, day: Weekday) {
        if let Some(pos) = self.selected_days.iter().position(|d| *d == day) {
            self.selected_days.remove(pos);
        } else {
            self.selected_days.push(day);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftEvent {
    CategorySelected(SelectedCategory),
    TitleEntered(String),
    /// Keeps the title prefilled from the category.
    TitleAccepted,
    DescriptionEntered(String),
    ProfileLoaded(Location),
    DateSelected(NaiveDate),
    TimeSelected(NaiveTime),
    RecurrenceChosen(Recurrence),
    DayToggled(Weekday),
}

impl DraftEvent {
    fn step(&self) -> WizardStep {
        match self {
            DraftEvent::CategorySelected(_) => WizardStep::Category,
            DraftEvent::TitleEntered(_) | DraftEvent::TitleAccepted => WizardStep::Title,
            DraftEvent::DescriptionEntered(_) => WizardStep::Description,
            DraftEvent::ProfileLoaded(_) => WizardStep::Location,
            DraftEvent::DateSelected(_) | DraftEvent::TimeSelected(_) => WizardStep::Schedule,
            DraftEvent::RecurrenceChosen(_) | DraftEvent::DayToggled(_) => WizardStep::Recurrence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: WizardStep,
    pub to: WizardStep,
    pub delay: Duration,
}

/// Transitions caused by an event that belongs to `trigger`. Only the current step
/// can be completed by its own event; the location step completes on entry once the
/// profile is known.
pub fn advance(current: WizardStep, draft: &BookingDraft, trigger: WizardStep) -> Vec<Transition> {
    let mut transitions = Vec::new();
    if trigger != current {
        return transitions;
    }

    let mut step = current;
    while draft.is_complete(step) {
        let Some(next) = step.next() else { break };
        transitions.push(Transition {
            from: step,
            to: next,
            delay: step.pacing_delay(),
        });
        step = next;
        if step != WizardStep::Location {
            break;
        }
    }
    transitions
}

#[derive(Debug, Clone)]
pub struct Wizard {
    step: WizardStep,
    draft: BookingDraft,
}

impl Default for Wizard {
    fn default() -> Self {
        Wizard::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Wizard {
            step: WizardStep::Category,
            draft: BookingDraft::default(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &BookingDraft {
        &self.draft
    }

    /// Submit becomes available on the last step once its fields are complete.
    pub fn can_submit(&self) -> bool {
        self.step == WizardStep::Recurrence && self.draft.is_complete(WizardStep::Recurrence)
    }

    pub fn apply(&mut self, event: DraftEvent, today: NaiveDate) -> Result<Vec<Transition>, ValidationError> {
        let trigger = event.step();
        match event {
            DraftEvent::CategorySelected(category) => {
                if self.draft.title.is_none() {
                    self.draft.title = Some(format!("{} Service Request", category.name));
                }
                self.draft.category = Some(category);
            }
            DraftEvent::TitleEntered(title) => self.draft.title = trimmed(title),
            DraftEvent::TitleAccepted => {}
            DraftEvent::DescriptionEntered(description) => {
                self.draft.description = trimmed(description)
            }
            DraftEvent::ProfileLoaded(location) => self.draft.location = Some(location),
            DraftEvent::DateSelected(date) => {
                if date < today {
                    return Err(ValidationError::DateInPast);
                }
                self.draft.preferred_date = Some(date);
            }
            DraftEvent::TimeSelected(time) => {
                if !within_service_window(time) {
                    return Err(ValidationError::TimeOutsideWindow);
                }
                self.draft.preferred_time = Some(time);
            }
            DraftEvent::RecurrenceChosen(recurrence) => self.draft.recurrence = recurrence,
            DraftEvent::DayToggled(day) => self.draft.toggle_day(day),
        }

        let transitions = advance(self.step, &self.draft, trigger);
        if let Some(last) = transitions.last() {
            self.step = self.step.max(last.to);
        }
        Ok(transitions)
    }
}

fn trimmed(value: String) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
