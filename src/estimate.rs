use std::fmt;

use chrono::NaiveDate;

use crate::wizard::{BookingDraft, Recurrence};

/// Amount in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(i64);

impl Money {
    pub const fn rands(amount: i64) -> Self {
        Money(amount * 100)
    }

    fn times(self, factor: i64) -> Self {
        Money(self.0 * factor)
    }

    // numerator/denominator, half-up
    fn scale(self, numerator: i64, denominator: i64) -> Self {
        Money((self.0 * numerator * 2 + denominator) / (denominator * 2))
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

pub const CALL_OUT_FEE: Money = Money::rands(100);
pub const DISTANCE_FEE: Money = Money::rands(50);
pub const DEFAULT_BASE_PRICE: Money = Money::rands(150);

// First match wins
const BASE_PRICES: &[(&str, Money)] = &[
    ("electrical", Money::rands(250)),
    ("plumbing", Money::rands(200)),
    ("hvac", Money::rands(300)),
    ("aircon", Money::rands(300)),
];

// 4.33 weeks per month, less the 15% recurring discount
const MONTHLY_FACTOR: (i64, i64) = (433 * 85, 100 * 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMultiplier {
    Standard,
    Urgent,
}

impl TimeMultiplier {
    pub fn for_date(preferred_date: Option<NaiveDate>, today: NaiveDate) -> Self {
        match preferred_date {
            Some(date) if (date - today).num_days() <= 1 => TimeMultiplier::Urgent,
            _ => TimeMultiplier::Standard,
        }
    }

    fn apply(self, amount: Money) -> Money {
        match self {
            TimeMultiplier::Standard => amount,
            TimeMultiplier::Urgent => amount.scale(3, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Estimate {
    OneTime {
        per_visit: Money,
    },
    Recurring {
        per_visit: Money,
        visits_per_week: usize,
        weekly: Money,
        monthly: Money,
    },
}

impl Estimate {
    pub fn per_visit(&self) -> Money {
        match self {
            Estimate::OneTime { per_visit } | Estimate::Recurring { per_visit, .. } => *per_visit,
        }
    }
}

pub fn base_price(category_name: Option<&str>) -> Money {
    let Some(name) = category_name else {
        return DEFAULT_BASE_PRICE;
    };
    let name = name.to_lowercase();
    BASE_PRICES
        .iter()
        .find(|(keyword, _)| name.contains(*keyword))
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_BASE_PRICE)
}

pub fn calculate(draft: &BookingDraft, today: NaiveDate) -> Estimate {
    let base = base_price(draft.category.as_ref().map(|c| c.name.as_str()));
    let multiplier = TimeMultiplier::for_date(draft.preferred_date, today);
    let subtotal = multiplier.apply(base + CALL_OUT_FEE + DISTANCE_FEE);

    match draft.recurrence {
        Recurrence::Recurring if !draft.selected_days.is_empty() => {
            let visits = draft.selected_days.len();
            let weekly = subtotal.times(visits as i64);
            let monthly = weekly.scale(MONTHLY_FACTOR.0, MONTHLY_FACTOR.1);
            Estimate::Recurring {
                per_visit: subtotal,
                visits_per_week: visits,
                weekly,
                monthly,
            }
        }
        _ => Estimate::OneTime { per_visit: subtotal },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::{BookingDraft, SelectedCategory};
    use chrono::{Duration, Weekday};
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn draft(category: &str, days_ahead: i64) -> BookingDraft {
        BookingDraft {
            category: Some(SelectedCategory {
                id: Uuid::new_v4(),
                name: category.to_string(),
            }),
            preferred_date: Some(today() + Duration::days(days_ahead)),
            ..BookingDraft::default()
        }
    }

    #[test]
    fn unknown_categories_use_default_base_price() {
        assert_eq!(base_price(Some("Garden Services")), Money::rands(150));
        assert_eq!(base_price(Some("")), Money::rands(150));
        assert_eq!(base_price(None), Money::rands(150));
    }

    #[test]
    fn keyword_match_is_case_insensitive_and_ordered() {
        assert_eq!(base_price(Some("ELECTRICAL repairs")), Money::rands(250));
        assert_eq!(base_price(Some("Plumbing and Electrical")), Money::rands(250));
        assert_eq!(base_price(Some("HVAC & Plumbing")), Money::rands(200));
        assert_eq!(base_price(Some("Aircon Servicing")), Money::rands(300));
        assert_eq!(base_price(Some("hvac")), Money::rands(300));
    }

    #[test]
    fn same_and_next_day_bookings_are_urgent() {
        assert_eq!(TimeMultiplier::for_date(Some(today()), today()), TimeMultiplier::Urgent);
        assert_eq!(
            TimeMultiplier::for_date(Some(today() + Duration::days(1)), today()),
            TimeMultiplier::Urgent
        );
        assert_eq!(
            TimeMultiplier::for_date(Some(today() + Duration::days(2)), today()),
            TimeMultiplier::Standard
        );
        assert_eq!(TimeMultiplier::for_date(None, today()), TimeMultiplier::Standard);
    }

    #[test]
    fn urgent_electrical_one_time_booking() {
        let estimate = calculate(&draft("Electrical Services", 0), today());
        assert_eq!(estimate, Estimate::OneTime { per_visit: Money::rands(600) });
        assert_eq!(estimate.per_visit().to_string(), "R600.00");
    }

    #[test]
    fn recurring_plumbing_booking_gets_monthly_discount() {
        let mut d = draft("Plumbing & Leaks", 5);
        d.recurrence = Recurrence::Recurring;
        d.selected_days = vec![Weekday::Tue, Weekday::Thu];

        match calculate(&d, today()) {
            Estimate::Recurring { per_visit, visits_per_week, weekly, monthly } => {
                assert_eq!(per_visit, Money::rands(350));
                assert_eq!(visits_per_week, 2);
                assert_eq!(weekly, Money::rands(700));
                assert_eq!(monthly.to_string(), "R2576.35");
            }
            other => panic!("expected recurring estimate, got {:?}", other),
        }
    }

    #[test]
    fn three_visits_a_week_multiply_the_subtotal() {
        let mut d = draft("Cleaning", 3);
        d.recurrence = Recurrence::Recurring;
        d.selected_days = vec![Weekday::Mon, Weekday::Wed, Weekday::Fri];

        let Estimate::Recurring { per_visit, weekly, monthly, .. } = calculate(&d, today()) else {
            panic!("expected recurring estimate");
        };
        assert_eq!(per_visit, Money::rands(300));
        assert_eq!(weekly, Money::rands(900));
        // 900 * 4.33 * 0.85 = 3312.45
        assert_eq!(monthly, Money(331_245));
    }

    #[test]
    fn recurring_without_days_is_shown_as_one_time() {
        let mut d = draft("Plumbing", 4);
        d.recurrence = Recurrence::Recurring;
        assert_eq!(calculate(&d, today()), Estimate::OneTime { per_visit: Money::rands(350) });
    }

    #[test]
    fn money_formats_cents() {
        assert_eq!(Money(5).to_string(), "R0.05");
        assert_eq!(Money(257_635).to_string(), "R2576.35");
    }
}
