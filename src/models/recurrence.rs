use chrono::{DateTime, FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, RecurrenceViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Frequency {
    Daily,
    Weekly,
    Hourly,
    TimesPerDay,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ActiveHours {
    pub fn window_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Unvalidated rule description, as received from callers or storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRuleInput {
    pub frequency: Frequency,
    pub anchor: DateTime<FixedOffset>,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    #[serde(default = "default_times_per_day")]
    pub times_per_day: u32,
    #[serde(default)]
    pub specific_times: Option<Vec<NaiveTime>>,
    #[serde(default)]
    pub active_hours: ActiveHours,
    #[serde(default)]
    pub end_date: Option<DateTime<FixedOffset>>,
}

fn default_interval() -> u32 {
    1
}

fn default_times_per_day() -> u32 {
    2
}

impl RecurringRuleInput {
    pub fn new(frequency: Frequency, anchor: DateTime<FixedOffset>) -> Self {
        Self {
            frequency,
            anchor,
            interval: default_interval(),
            days_of_week: Vec::new(),
            times_per_day: default_times_per_day(),
            specific_times: None,
            active_hours: ActiveHours::default(),
            end_date: None,
        }
    }
}

/// A recurrence rule that passed validation. Only obtainable through
/// [`RecurringRule::new`] (serde goes through the same path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecurringRuleInput", into = "RecurringRuleInput")]
pub struct RecurringRule {
    frequency: Frequency,
    anchor: DateTime<FixedOffset>,
    interval: u32,
    days_of_week: Vec<Weekday>,
    times_per_day: u32,
    specific_times: Option<Vec<NaiveTime>>,
    active_hours: ActiveHours,
    end_date: Option<DateTime<FixedOffset>>,
}

impl RecurringRule {
    pub fn new(input: RecurringRuleInput) -> AppResult<Self> {
        let RecurringRuleInput {
            frequency,
            anchor,
            interval,
            days_of_week,
            times_per_day,
            specific_times,
            active_hours,
            end_date,
        } = input;

        if matches!(frequency, Frequency::Custom | Frequency::Hourly) && interval < 1 {
            return Err(AppError::invalid_recurrence(
                RecurrenceViolation::IntervalTooSmall,
                format!("interval must be at least 1, got {interval}"),
            ));
        }

        if frequency == Frequency::TimesPerDay {
            if times_per_day < 2 {
                return Err(AppError::invalid_recurrence(
                    RecurrenceViolation::TimesPerDayTooSmall,
                    format!("times per day must be at least 2, got {times_per_day}"),
                ));
            }
            if let Some(times) = &specific_times {
                if times.len() != times_per_day as usize {
                    return Err(AppError::invalid_recurrence(
                        RecurrenceViolation::SpecificTimesMismatch,
                        format!(
                            "{} specific times given for {} times per day",
                            times.len(),
                            times_per_day
                        ),
                    ));
                }
            }
        }

        if active_hours.end <= active_hours.start {
            return Err(AppError::invalid_recurrence(
                RecurrenceViolation::EmptyActiveHours,
                "active hours must end after they start",
            ));
        }

        let mut days_of_week = days_of_week;
        days_of_week.sort_by_key(|day| day.num_days_from_monday());
        days_of_week.dedup();
        if frequency == Frequency::Weekly && days_of_week.is_empty() {
            return Err(AppError::invalid_recurrence(
                RecurrenceViolation::NoWeekdaysSelected,
                "weekly rules need at least one weekday",
            ));
        }

        if let Some(end) = end_date {
            if end < anchor {
                return Err(AppError::invalid_recurrence(
                    RecurrenceViolation::EndBeforeAnchor,
                    "end date precedes the first occurrence",
                ));
            }
        }

        let specific_times = specific_times.map(|mut times| {
            times.sort();
            times
        });

        Ok(Self {
            frequency,
            anchor,
            interval,
            days_of_week,
            times_per_day,
            specific_times,
            active_hours,
            end_date,
        })
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn anchor(&self) -> DateTime<FixedOffset> {
        self.anchor
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn days_of_week(&self) -> &[Weekday] {
        &self.days_of_week
    }

    pub fn times_per_day(&self) -> u32 {
        self.times_per_day
    }

    pub fn specific_times(&self) -> Option<&[NaiveTime]> {
        self.specific_times.as_deref()
    }

    pub fn active_hours(&self) -> ActiveHours {
        self.active_hours
    }

    pub fn end_date(&self) -> Option<DateTime<FixedOffset>> {
        self.end_date
    }
}

impl TryFrom<RecurringRuleInput> for RecurringRule {
    type Error = AppError;

    fn try_from(input: RecurringRuleInput) -> Result<Self, Self::Error> {
        RecurringRule::new(input)
    }
}

impl From<RecurringRule> for RecurringRuleInput {
    fn from(rule: RecurringRule) -> Self {
        Self {
            frequency: rule.frequency,
            anchor: rule.anchor,
            interval: rule.interval,
            days_of_week: rule.days_of_week,
            times_per_day: rule.times_per_day,
            specific_times: rule.specific_times,
            active_hours: rule.active_hours,
            end_date: rule.end_date,
        }
    }
}
