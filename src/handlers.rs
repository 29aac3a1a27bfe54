use std::{collections::HashMap, error::Error, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate, NaiveTime, Weekday};
use log::{debug, error, info, warn};
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId, UserId},
};
use time::macros::format_description;
use tokio::{sync::Mutex, task::JoinHandle};
use uuid::Uuid;

use crate::backend::{MarketplaceBackend, ProviderSearch};
use crate::booking;
use crate::config::Config;
use crate::error::BookingError;
use crate::estimate::{self, Estimate};
use crate::models::{ServiceCategory, ServiceRequest, UserProfile};
use crate::wizard::{
    BookingDraft, DraftEvent, Recurrence, SelectedCategory, Wizard, WizardStep, SERVICE_CLOSES_AT,
    SERVICE_OPENS_AT, TOTAL_STEPS,
};

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

const DAYS_OF_WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn MarketplaceBackend>,
    pub config: Arc<Config>,
    pub sessions: Arc<Mutex<HashMap<UserId, UserSession>>>,
}

impl AppState {
    pub fn new(backend: Arc<dyn MarketplaceBackend>, config: Config) -> Self {
        AppState {
            backend,
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

// Booking form state for one customer
pub struct UserSession {
    wizard: Wizard,
    profile: Option<UserProfile>,
    categories: Vec<ServiceCategory>,
    submitting: bool,
    reveal: Option<JoinHandle<()>>,
}

impl UserSession {
    fn new(categories: Vec<ServiceCategory>, profile: Option<UserProfile>) -> Self {
        UserSession {
            wizard: Wizard::new(),
            profile,
            categories,
            submitting: false,
            reveal: None,
        }
    }

    fn cancel_reveal(&mut self) {
        if let Some(handle) = self.reveal.take() {
            handle.abort();
        }
    }
}

impl Drop for UserSession {
    fn drop(&mut self) {
        self.cancel_reveal();
    }
}

struct Prompt {
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
}

impl Prompt {
    fn text(text: impl Into<String>) -> Self {
        Prompt {
            text: text.into(),
            keyboard: None,
        }
    }
}

// Built while the session is locked, sent once the lock is released
enum Reply {
    Send(Prompt),
    Edit(MessageId, Prompt),
}

/// Where delayed step prompts end up.
#[async_trait]
trait PromptSink: Send + Sync + 'static {
    async fn show(&self, prompt: Prompt) -> HandlerResult;
}

struct ChatSink {
    bot: Bot,
    chat_id: ChatId,
}

impl ChatSink {
    fn new(bot: &Bot, chat_id: ChatId) -> Self {
        ChatSink {
            bot: bot.clone(),
            chat_id,
        }
    }
}

#[async_trait]
impl PromptSink for ChatSink {
    async fn show(&self, prompt: Prompt) -> HandlerResult {
        if let Err(e) = send_prompt(&self.bot, self.chat_id, prompt).await {
            error!("Failed to show next step to {}: {}", self.chat_id.0, e);
            return Err(e.into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Callback {
    Category(Uuid),
    KeepTitle,
    SelectDate(NaiveDate),
    ShowMonth { month: u32, year: i32 },
    Time(NaiveTime),
    Recurrence(Recurrence),
    Day(Weekday),
    Submit,
    Providers(Uuid),
    Ignore,
}

fn parse_callback(data: &str) -> Option<Callback> {
    let parts = data.split(':').collect::<Vec<&str>>();
    match parts.as_slice() {
        ["category", id] => id.parse().ok().map(Callback::Category),
        ["title", "keep"] => Some(Callback::KeepTitle),
        ["calendar", "select", date] => NaiveDate::parse_from_str(date, "%Y-%m-%d").ok().map(Callback::SelectDate),
        ["calendar", "month", month, year] => {
            let month = month.parse::<u32>().ok().filter(|m| (1..=12).contains(m))?;
            let year = year.parse::<i32>().ok()?;
            Some(Callback::ShowMonth { month, year })
        }
        ["time", hour, minute] => {
            NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0).map(Callback::Time)
        }
        ["recurrence", "one-time"] => Some(Callback::Recurrence(Recurrence::OneTime)),
        ["recurrence", "recurring"] => Some(Callback::Recurrence(Recurrence::Recurring)),
        ["day", day] => day.parse::<Weekday>().ok().map(Callback::Day),
        ["submit"] => Some(Callback::Submit),
        ["providers", id] => id.parse().ok().map(Callback::Providers),
        ["ignore"] => Some(Callback::Ignore),
        _ => None,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub async fn handle_message(bot: Bot, msg: Message, state: AppState) -> HandlerResult {
    let chat_id = msg.chat.id;
    let (Some(text), Some(user)) = (msg.text(), msg.from.as_ref()) else {
        return Ok(());
    };
    let user_id = user.id;

    if text.starts_with('/') {
        let (command, argument) = match text.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (text, ""),
        };
        // "/book@SomeBot" in group chats
        let command = command.split('@').next().unwrap_or(command);
        return match command {
            "/start" => show_welcome(&bot, chat_id).await,
            "/book" => start_booking(&bot, chat_id, user_id, &state, argument).await,
            "/history" => show_service_history(&bot, chat_id, user_id, &state).await,
            "/cancel" => {
                state.sessions.lock().await.remove(&user_id);
                info!("Booking cancelled by {}", user_id.0);
                bot.send_message(chat_id, "Booking cancelled. Send /book to start again.").await?;
                Ok(())
            }
            _ => {
                bot.send_message(chat_id, "Unknown command").await?;
                Ok(())
            }
        };
    }

    let replies = {
        let mut sessions = state.sessions.lock().await;
        match sessions.get_mut(&user_id) {
            None => vec![Reply::Send(Prompt::text("Send /book to request a service."))],
            Some(session) => {
                let event = match session.wizard.step() {
                    WizardStep::Title => Some(DraftEvent::TitleEntered(text.to_string())),
                    WizardStep::Description => Some(DraftEvent::DescriptionEntered(text.to_string())),
                    _ => None,
                };
                match event {
                    Some(event) => {
                        let sink = ChatSink::new(&bot, chat_id);
                        apply_event(session, event, None, today(), &state.config, sink)
                    }
                    None => {
                        debug!("Ignoring text on step {:?} from {}", session.wizard.step(), user_id.0);
                        vec![Reply::Send(Prompt::text("Please use the buttons above."))]
                    }
                }
            }
        }
    };
    deliver(&bot, chat_id, replies).await
}

pub async fn handle_callback_query(q: CallbackQuery, bot: Bot, msg: Message, state: AppState) -> HandlerResult {
    let chat_id = msg.chat.id;
    let user_id = q.from.id;
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    debug!("Callback query from {}: {}", user_id.0, data);

    let Some(callback) = parse_callback(&data) else {
        warn!("Unknown callback data: {}", data);
        return Ok(());
    };

    match callback {
        Callback::Ignore => return Ok(()),
        Callback::Submit => return submit_booking(&bot, chat_id, user_id, msg.id, &state).await,
        Callback::Providers(request_id) => {
            let owner = user_id.0.to_string();
            return match booking::owned_request(state.backend.as_ref(), &owner, request_id).await? {
                Some(request) => show_matching_providers(&bot, chat_id, &state, &request).await,
                None => {
                    bot.send_message(chat_id, "This request is not available.").await?;
                    Ok(())
                }
            };
        }
        Callback::ShowMonth { month, year } => {
            bot.edit_message_reply_markup(chat_id, msg.id)
                .reply_markup(generate_calendar(month, year, today()))
                .await?;
            return Ok(());
        }
        _ => {}
    }

    let replies = {
        let mut sessions = state.sessions.lock().await;
        match sessions.get_mut(&user_id) {
            None => vec![Reply::Send(Prompt::text("This booking has expired. Send /book to start again."))],
            Some(session) => {
                let event = match callback {
                    Callback::Category(id) => session.categories.iter().find(|c| c.id == id).map(|category| {
                        DraftEvent::CategorySelected(SelectedCategory {
                            id: category.id,
                            name: category.name.clone(),
                        })
                    }),
                    Callback::KeepTitle => Some(DraftEvent::TitleAccepted),
                    Callback::SelectDate(date) => Some(DraftEvent::DateSelected(date)),
                    Callback::Time(time) => Some(DraftEvent::TimeSelected(time)),
                    Callback::Recurrence(recurrence) => Some(DraftEvent::RecurrenceChosen(recurrence)),
                    Callback::Day(day) => Some(DraftEvent::DayToggled(day)),
                    _ => None,
                };
                match event {
                    Some(event) => {
                        let sink = ChatSink::new(&bot, chat_id);
                        apply_event(session, event, Some(msg.id), today(), &state.config, sink)
                    }
                    None => vec![Reply::Send(Prompt::text("This service is no longer available."))],
                }
            }
        }
    };
    deliver(&bot, chat_id, replies).await
}

async fn show_welcome(bot: &Bot, chat_id: ChatId) -> HandlerResult {
    bot.send_message(
        chat_id,
        "Hi! I can book a plumber, electrician or other local service provider near you.\n\n\
         /book - request a service\n\
         /book <service> - start with a service, e.g. /book plumbing\n\
         /history - your service requests\n\
         /cancel - drop the current booking",
    )
    .await?;
    Ok(())
}

async fn start_booking(bot: &Bot, chat_id: ChatId, user_id: UserId, state: &AppState, preselected: &str) -> HandlerResult {
    let owner = user_id.0.to_string();
    let (categories, profile) = tokio::join!(
        state.backend.service_categories(),
        state.backend.user_profile(&owner)
    );

    let categories = match categories {
        Ok(categories) => categories,
        Err(e) => {
            error!("Error loading data: {}", e);
            bot.send_message(chat_id, "Couldn't load services. Please try again later.").await?;
            return Ok(());
        }
    };
    let profile = match profile {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            info!("No profile for user {}", owner);
            bot.send_message(chat_id, "We couldn't find your profile. Please finish signing up in the app first.")
                .await?;
            return Ok(());
        }
        Err(e) => {
            error!("Error loading profile for {}: {}", owner, e);
            bot.send_message(chat_id, "Couldn't load your profile. Please try again later.").await?;
            return Ok(());
        }
    };

    if categories.is_empty() {
        bot.send_message(chat_id, "No services are available right now 😢").await?;
        return Ok(());
    }

    info!("Starting booking for user {}", owner);
    if let Some(name) = profile.profile.full_name.as_deref().filter(|n| !n.is_empty()) {
        bot.send_message(chat_id, format!("Hi {}! Let's book a service.", name)).await?;
    }
    let location = profile.location();
    let preselected = if preselected.is_empty() {
        None
    } else {
        booking::match_category(&categories, preselected).map(|c| SelectedCategory {
            id: c.id,
            name: c.name.clone(),
        })
    };

    let (prompt, replies) = {
        let mut sessions = state.sessions.lock().await;
        // Replacing a session drops it, which cancels its pending reveal
        sessions.insert(user_id, UserSession::new(categories, Some(profile)));
        let Some(session) = sessions.get_mut(&user_id) else {
            return Ok(());
        };

        let today = today();
        session.wizard.apply(DraftEvent::ProfileLoaded(location), today)?;
        let prompt = step_prompt(session, WizardStep::Category, today, &state.config);
        let replies = match preselected {
            Some(category) => {
                let sink = ChatSink::new(bot, chat_id);
                apply_event(session, DraftEvent::CategorySelected(category), None, today, &state.config, sink)
            }
            None => Vec::new(),
        };
        (prompt, replies)
    };

    send_prompt(bot, chat_id, prompt).await?;
    deliver(bot, chat_id, replies).await
}

/// Applies the event to the form. State is committed right away; prompts for steps
/// that were just entered are revealed through `sink` after their pacing delays.
fn apply_event(
    session: &mut UserSession,
    event: DraftEvent,
    source: Option<MessageId>,
    today: NaiveDate,
    config: &Config,
    sink: impl PromptSink,
) -> Vec<Reply> {
    let transitions = match session.wizard.apply(event.clone(), today) {
        Ok(transitions) => transitions,
        Err(e) => {
            warn!("Rejected {:?} on step {:?}: {}", event, session.wizard.step(), e);
            return vec![Reply::Send(Prompt::text(e.to_string()))];
        }
    };

    if !transitions.is_empty() {
        let prompts = transitions
            .iter()
            .map(|t| (t.delay, step_prompt(session, t.to, today, config)))
            .collect::<Vec<_>>();
        schedule_reveal(session, prompts, sink);
        return Vec::new();
    }

    let reply = match (session.wizard.step(), &event, source) {
        (WizardStep::Schedule, DraftEvent::DateSelected(_), Some(message_id)) => Reply::Edit(
            message_id,
            Prompt {
                text: "Preferred time (07:00-17:00):".to_string(),
                keyboard: Some(time_slot_keyboard()),
            },
        ),
        (WizardStep::Schedule, DraftEvent::TimeSelected(_), _) => Reply::Send(Prompt {
            text: "Now pick a date:".to_string(),
            keyboard: Some(generate_calendar(today.month(), today.year(), today)),
        }),
        (WizardStep::Recurrence, _, Some(message_id)) => {
            Reply::Edit(message_id, step_prompt(session, WizardStep::Recurrence, today, config))
        }
        (WizardStep::Title, DraftEvent::TitleEntered(_), _) => {
            Reply::Send(Prompt::text("The title can't be empty. Please send a short title."))
        }
        (WizardStep::Description, DraftEvent::DescriptionEntered(_), _) => {
            Reply::Send(Prompt::text("Please describe the issue in a few words."))
        }
        _ => return Vec::new(),
    };
    vec![reply]
}

// Next section is revealed after the completion pause; a newer transition replaces it.
fn schedule_reveal(session: &mut UserSession, prompts: Vec<(Duration, Prompt)>, sink: impl PromptSink) {
    session.cancel_reveal();
    session.reveal = Some(tokio::spawn(async move {
        for (delay, prompt) in prompts {
            tokio::time::sleep(delay).await;
            if sink.show(prompt).await.is_err() {
                return;
            }
        }
    }));
}

async fn deliver(bot: &Bot, chat_id: ChatId, replies: Vec<Reply>) -> HandlerResult {
    for reply in replies {
        match reply {
            Reply::Send(prompt) => {
                send_prompt(bot, chat_id, prompt).await?;
            }
            Reply::Edit(message_id, prompt) => {
                let mut edit = bot.edit_message_text(chat_id, message_id, prompt.text);
                if let Some(keyboard) = prompt.keyboard {
                    edit = edit.reply_markup(keyboard);
                }
                edit.await?;
            }
        }
    }
    Ok(())
}

async fn send_prompt(bot: &Bot, chat_id: ChatId, prompt: Prompt) -> Result<Message, teloxide::RequestError> {
    let request = bot.send_message(chat_id, prompt.text);
    match prompt.keyboard {
        Some(keyboard) => request.reply_markup(keyboard).await,
        None => request.await,
    }
}

fn step_prompt(session: &UserSession, step: WizardStep, today: NaiveDate, config: &Config) -> Prompt {
    let draft = session.wizard.draft();
    let header = format!("{}\nStep {} of {}", progress_line(step), step.number(), TOTAL_STEPS);

    match step {
        WizardStep::Category => {
            let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
            let mut descriptions = String::new();
            for category in &session.categories {
                keyboard.push(vec![InlineKeyboardButton::callback(
                    category.name.clone(),
                    format!("category:{}", category.id),
                )]);
                if let Some(description) = &category.description {
                    descriptions.push_str(&format!("\n• {}: {}", category.name, description));
                }
            }
            Prompt {
                text: format!("{}\n\nService Type *\nSelect a service{}", header, descriptions),
                keyboard: Some(InlineKeyboardMarkup::new(keyboard)),
            }
        }
        WizardStep::Title => match &draft.title {
            Some(title) => Prompt {
                text: format!(
                    "{}\n\nService Title *\n{}\n\nKeep it or send a new title, e.g. \"Fix leaking kitchen tap\"",
                    header, title
                ),
                keyboard: Some(generate_inline_markup("title", &["Keep this title"], &["keep"])),
            },
            None => Prompt {
                text: format!("{}\n\nService Title *\nSend a short title, e.g. \"Fix leaking kitchen tap\"", header),
                keyboard: None,
            },
        },
        WizardStep::Description => Prompt {
            text: format!("{}\n\nDescription *\nDescribe the issue in detail...", header),
            keyboard: None,
        },
        WizardStep::Location => {
            let location = draft
                .location
                .as_ref()
                .map(|l| l.display())
                .unwrap_or_else(|| "Loading your address...".to_string());
            let keyboard = config.profile_url.clone().map(|url| {
                InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url("Change location", url)]])
            });
            Prompt {
                text: format!("{}\n\nService Location\n📍 {}", header, location),
                keyboard,
            }
        }
        WizardStep::Schedule => Prompt {
            text: format!("{}\n\nPreferred Date & Time *\nPick a date:", header),
            keyboard: Some(generate_calendar(today.month(), today.year(), today)),
        },
        WizardStep::Recurrence => Prompt {
            text: format!(
                "{}\n\nHow often do you need this service? *\n\n{}",
                header,
                booking_summary(draft, step, today)
            ),
            keyboard: Some(recurrence_keyboard(&session.wizard)),
        },
    }
}

fn progress_line(step: WizardStep) -> String {
    (1..=TOTAL_STEPS)
        .map(|n| {
            if n < step.number() {
                "✅".to_string()
            } else if n == step.number() {
                format!("[{}]", n)
            } else {
                "○".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn booking_summary(draft: &BookingDraft, step: WizardStep, today: NaiveDate) -> String {
    let mut summary = String::from("📋 Booking Summary\n");

    if let Some(category) = &draft.category {
        summary.push_str(&format!("\nService: {}", category.name));
    }
    if let Some(title) = &draft.title {
        summary.push_str(&format!("\nTitle: {}", title));
    }
    if step >= WizardStep::Location {
        if let Some(location) = &draft.location {
            summary.push_str(&format!("\nLocation: 📍 {}", location.display()));
        }
    }
    if draft.preferred_date.is_some() || draft.preferred_time.is_some() {
        let mut when = Vec::new();
        if let Some(date) = draft.preferred_date {
            when.push(format!("📅 {}", date.format("%d/%m/%Y")));
        }
        if let Some(time) = draft.preferred_time {
            when.push(format!("🕐 {}", time.format("%H:%M")));
        }
        summary.push_str(&format!("\nWhen: {}", when.join(" ")));
    }
    summary.push_str(&format!("\nService Type: {}", draft.recurrence.label()));

    if draft.recurrence == Recurrence::Recurring && !draft.selected_days.is_empty() {
        let days = draft
            .selected_days
            .iter()
            .map(|d| short_day_name(*d))
            .collect::<Vec<_>>()
            .join(", ");
        let visits = draft.selected_days.len();
        summary.push_str(&format!(
            "\nRecurring Schedule: {}\n{} visit{} per week",
            days,
            visits,
            if visits > 1 { "s" } else { "" }
        ));
    }

    summary.push_str("\n\n💰 Estimated Price\n");
    let estimate = estimate::calculate(draft, today);
    summary.push_str(&estimate.per_visit().to_string());
    if let Estimate::Recurring { weekly, monthly, .. } = estimate {
        summary.push_str(&format!(
            " per visit\nWeekly: {}\nMonthly: {}\nSaving 15% with recurring service",
            weekly, monthly
        ));
    }
    summary.push_str("\nIncludes: Service + Call-out fee + Travel\nFinal price confirmed by provider");
    summary
}

fn recurrence_keyboard(wizard: &Wizard) -> InlineKeyboardMarkup {
    let draft = wizard.draft();
    let mark = |selected: bool| if selected { "✔ " } else { "" };
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = vec![
        vec![InlineKeyboardButton::callback(
            format!("{}One-Time Service", mark(draft.recurrence == Recurrence::OneTime)),
            "recurrence:one-time",
        )],
        vec![InlineKeyboardButton::callback(
            format!("{}Recurring Service (save 15%)", mark(draft.recurrence == Recurrence::Recurring)),
            "recurrence:recurring",
        )],
    ];

    if draft.recurrence == Recurrence::Recurring {
        for pair in DAYS_OF_WEEK.chunks(2) {
            keyboard.push(
                pair.iter()
                    .map(|day| {
                        InlineKeyboardButton::callback(
                            format!("{}{}", mark(draft.selected_days.contains(day)), day_name(*day)),
                            format!("day:{}", day_name(*day).to_lowercase()),
                        )
                    })
                    .collect(),
            );
        }
    }

    if wizard.can_submit() {
        keyboard.push(vec![InlineKeyboardButton::callback("🔍 Find a Provider", "submit")]);
    }
    InlineKeyboardMarkup::new(keyboard)
}

async fn submit_booking(bot: &Bot, chat_id: ChatId, user_id: UserId, message_id: MessageId, state: &AppState) -> HandlerResult {
    let prepared = {
        let mut sessions = state.sessions.lock().await;
        match sessions.get_mut(&user_id) {
            None => Err("This booking has expired. Send /book to start again.".to_string()),
            Some(session) if session.submitting => {
                debug!("Submission already running for {}", user_id.0);
                return Ok(());
            }
            Some(session) => match booking::validate(session.wizard.draft(), session.profile.as_ref()) {
                Err(e) => {
                    warn!("Submission rejected for {}: {}", user_id.0, e);
                    Err(e.to_string())
                }
                Ok(()) => {
                    session.submitting = true;
                    Ok((session.wizard.draft().clone(), session.profile.clone()))
                }
            },
        }
    };
    let (draft, profile) = match prepared {
        Ok(prepared) => prepared,
        Err(message) => {
            bot.send_message(chat_id, message).await?;
            return Ok(());
        }
    };

    if let Err(e) = bot
        .edit_message_text(
            chat_id,
            message_id,
            "⏳ Finding your match\n\nWe're finding service providers that match your requirements.",
        )
        .await
    {
        warn!("Failed to show the matching screen to {}: {}", user_id.0, e);
    }

    match booking::submit(state.backend.as_ref(), &draft, profile.as_ref()).await {
        Ok(request) => {
            close_submitted(&mut *state.sessions.lock().await, user_id);
            show_matching_providers(bot, chat_id, state, &request).await
        }
        Err(e) => {
            warn!("Submission failed for {}: {}", user_id.0, e);
            // Back to the filled form so the request can be sent again
            let summary = {
                let mut sessions = state.sessions.lock().await;
                match sessions.get_mut(&user_id) {
                    Some(session) => {
                        session.submitting = false;
                        matches!(e, BookingError::Backend(_))
                            .then(|| step_prompt(session, WizardStep::Recurrence, today(), &state.config))
                    }
                    None => None,
                }
            };

            if let Err(send_error) = bot.send_message(chat_id, e.to_string()).await {
                error!("Failed to report submission error to {}: {}", user_id.0, send_error);
            }
            if let Some(prompt) = summary {
                send_prompt(bot, chat_id, prompt).await?;
            }
            Ok(())
        }
    }
}

// Drops the submitted form; one started with /book during the hold is kept.
fn close_submitted(sessions: &mut HashMap<UserId, UserSession>, user_id: UserId) {
    if sessions.get(&user_id).is_some_and(|s| s.submitting) {
        sessions.remove(&user_id);
    }
}

async fn show_matching_providers(bot: &Bot, chat_id: ChatId, state: &AppState, request: &ServiceRequest) -> HandlerResult {
    let search = ProviderSearch {
        latitude: request.latitude,
        longitude: request.longitude,
        category_id: request.category_id,
        max_distance_km: state.config.match_radius_km,
    };

    let providers = match state.backend.find_nearby_providers(&search).await {
        Ok(providers) => providers,
        Err(e) => {
            error!("Error finding providers for request {}: {}", request.id, e);
            bot.send_message(chat_id, "Your request was sent, but we couldn't load providers right now.")
                .reply_markup(refresh_keyboard(request.id))
                .await?;
            return Ok(());
        }
    };

    let mut message = format!("✅ Request \"{}\" submitted\n\n", request.title);
    if providers.is_empty() {
        message.push_str("No providers nearby yet. We'll let you know as soon as one is available.");
    } else {
        message.push_str(&format!("👷 {} provider(s) near you:\n", providers.len()));
        for provider in &providers {
            let rating = provider
                .average_rating
                .map(|r| format!(" · ⭐ {:.1}", r))
                .unwrap_or_default();
            message.push_str(&format!(
                "\n• {} · {:.1} km{}",
                provider.display_name(),
                provider.distance_km,
                rating
            ));
        }
    }

    bot.send_message(chat_id, message)
        .reply_markup(refresh_keyboard(request.id))
        .await?;
    Ok(())
}

fn refresh_keyboard(request_id: Uuid) -> InlineKeyboardMarkup {
    generate_inline_markup("providers", &["🔄 Refresh providers"], &[&request_id.to_string()])
}

async fn show_service_history(bot: &Bot, chat_id: ChatId, user_id: UserId, state: &AppState) -> HandlerResult {
    let Some(profile) = state.backend.user_profile(&user_id.0.to_string()).await? else {
        bot.send_message(chat_id, "We couldn't find your profile. Please finish signing up in the app first.")
            .await?;
        return Ok(());
    };

    let requests = state.backend.service_history(profile.profile.id).await?;
    if requests.is_empty() {
        bot.send_message(chat_id, "You haven't requested any services yet. Send /book to start.").await?;
        return Ok(());
    }

    let date_format = format_description!("[day].[month].[year]");
    let mut message = String::from("📋 Your service requests:\n");
    for request in &requests {
        message.push_str(&format!(
            "\n• {} ({})\n  {} · {}",
            request.title,
            request.category_name.as_deref().unwrap_or("Service"),
            request.created_at.format(&date_format).unwrap_or_default(),
            request.status
        ));
    }
    bot.send_message(chat_id, message).await?;
    Ok(())
}

pub fn generate_inline_markup(mark: &str, buttons: &[&str], actions: &[&str]) -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for (i, b) in buttons.iter().enumerate() {
        let action = actions.get(i).copied().unwrap_or("ignore");
        keyboard.push(vec![InlineKeyboardButton::callback(b.to_string(), format!("{}:{}", mark, action))]);
    }
    InlineKeyboardMarkup::new(keyboard)
}

fn time_slot_keyboard() -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    let mut row: Vec<InlineKeyboardButton> = Vec::new();
    for hour in SERVICE_OPENS_AT..=SERVICE_CLOSES_AT {
        row.push(InlineKeyboardButton::callback(
            format!("{:02}:00", hour),
            format!("time:{:02}:00", hour),
        ));
        if row.len() == 3 {
            keyboard.push(row.clone());
            row.clear();
        }
    }
    if !row.is_empty() {
        keyboard.push(row);
    }
    InlineKeyboardMarkup::new(keyboard)
}

pub fn generate_calendar(month: u32, year: i32, today: NaiveDate) -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    // 1. Month and year
    keyboard.push(vec![InlineKeyboardButton::callback(
        format!("📅 {} {}", month_name(month), year),
        "ignore".to_string(),
    )]);

    // 2. Weekdays
    keyboard.push(
        DAYS_OF_WEEK
            .iter()
            .map(|day| InlineKeyboardButton::callback(short_day_name(*day).to_string(), "ignore".to_string()))
            .collect(),
    );

    // 3. Days, past ones disabled
    if let Some(first_day) = NaiveDate::from_ymd_opt(year, month, 1) {
        let mut row: Vec<InlineKeyboardButton> = Vec::new();
        let shift = first_day.weekday().num_days_from_monday() as usize;
        for _ in 0..shift {
            row.push(InlineKeyboardButton::callback(" ".to_string(), "ignore".to_string()));
        }

        for day in 1..=days_in_month(month, year) {
            let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                continue;
            };
            if date < today {
                row.push(InlineKeyboardButton::callback(format!("❌ {}", day), "ignore".to_string()));
            } else {
                row.push(InlineKeyboardButton::callback(
                    format!("{:2}", day),
                    format!("calendar:select:{}", date),
                ));
            }

            if row.len() == 7 {
                keyboard.push(row.clone());
                row.clear();
            }
        }

        if !row.is_empty() {
            while row.len() < 7 {
                row.push(InlineKeyboardButton::callback(" ".to_string(), "ignore".to_string()));
            }
            keyboard.push(row);
        }
    }

    // 4. Month switch; no going back before the current month
    let (prev_month, prev_year) = if month == 1 { (12, year - 1) } else { (month - 1, year) };
    let (next_month, next_year) = if month == 12 { (1, year + 1) } else { (month + 1, year) };
    let mut nav = Vec::new();
    if (year, month) > (today.year(), today.month()) {
        nav.push(InlineKeyboardButton::callback(
            "< Month",
            format!("calendar:month:{}:{}", prev_month, prev_year),
        ));
    }
    nav.push(InlineKeyboardButton::callback(
        "Month >",
        format!("calendar:month:{}:{}", next_month, next_year),
    ));
    keyboard.push(nav);

    InlineKeyboardMarkup::new(keyboard)
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January", 2 => "February", 3 => "March", 4 => "April",
        5 => "May", 6 => "June", 7 => "July", 8 => "August",
        9 => "September", 10 => "October", 11 => "November", 12 => "December",
        _ => "",
    }
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn short_day_name(day: Weekday) -> &'static str {
    &day_name(day)[..3]
}

fn days_in_month(month: u32, year: i32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}
