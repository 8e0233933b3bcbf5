use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SuggestionAction {
    StartedImmediately,
    ViewedDetails,
    Snoozed1Hour,
    SnoozedEvening,
    SnoozedTomorrow,
    SkippedNotRelevant,
    SkippedWrongTime,
    SkippedNeedsFocus,
}

impl SuggestionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionAction::StartedImmediately => "started_immediately",
            SuggestionAction::ViewedDetails => "viewed_details",
            SuggestionAction::Snoozed1Hour => "snoozed_1_hour",
            SuggestionAction::SnoozedEvening => "snoozed_evening",
            SuggestionAction::SnoozedTomorrow => "snoozed_tomorrow",
            SuggestionAction::SkippedNotRelevant => "skipped_not_relevant",
            SuggestionAction::SkippedWrongTime => "skipped_wrong_time",
            SuggestionAction::SkippedNeedsFocus => "skipped_needs_focus",
        }
    }

    pub fn is_snooze(&self) -> bool {
        matches!(
            self,
            SuggestionAction::Snoozed1Hour
                | SuggestionAction::SnoozedEvening
                | SuggestionAction::SnoozedTomorrow
        )
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            SuggestionAction::SkippedNotRelevant
                | SuggestionAction::SkippedWrongTime
                | SuggestionAction::SkippedNeedsFocus
        )
    }
}

impl fmt::Display for SuggestionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse hour-of-day bucket used to key time affinity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HourBucket {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl HourBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => HourBucket::Night,
            6..=11 => HourBucket::Morning,
            12..=16 => HourBucket::Afternoon,
            _ => HourBucket::Evening,
        }
    }

    pub fn of(instant: DateTime<FixedOffset>) -> Self {
        Self::from_hour(instant.hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HourBucket::Night => "night",
            HourBucket::Morning => "morning",
            HourBucket::Afternoon => "afternoon",
            HourBucket::Evening => "evening",
        }
    }
}

impl FromStr for HourBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "night" => Ok(HourBucket::Night),
            "morning" => Ok(HourBucket::Morning),
            "afternoon" => Ok(HourBucket::Afternoon),
            "evening" => Ok(HourBucket::Evening),
            other => Err(format!("unsupported hour bucket: {other}")),
        }
    }
}

/// Addressable bias term. The string form is the repository key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BiasKey {
    Affinity { category: String, bucket: HourBucket },
    Category { category: String },
    DurationFit { category: String },
    Task { task_id: String },
}

impl BiasKey {
    pub fn affinity(category: &str, bucket: HourBucket) -> Self {
        BiasKey::Affinity {
            category: category.to_string(),
            bucket,
        }
    }

    pub fn category(category: &str) -> Self {
        BiasKey::Category {
            category: category.to_string(),
        }
    }

    pub fn duration_fit(category: &str) -> Self {
        BiasKey::DurationFit {
            category: category.to_string(),
        }
    }

    pub fn task(task_id: &str) -> Self {
        BiasKey::Task {
            task_id: task_id.to_string(),
        }
    }
}

impl fmt::Display for BiasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiasKey::Affinity { category, bucket } => {
                write!(f, "affinity:{}:{}", bucket.as_str(), category)
            }
            BiasKey::Category { category } => write!(f, "category:{category}"),
            BiasKey::DurationFit { category } => write!(f, "fit:{category}"),
            BiasKey::Task { task_id } => write!(f, "task:{task_id}"),
        }
    }
}

impl FromStr for BiasKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed bias key: {s}"))?;
        match kind {
            "affinity" => {
                let (bucket, category) = rest
                    .split_once(':')
                    .ok_or_else(|| format!("malformed affinity key: {s}"))?;
                Ok(BiasKey::Affinity {
                    category: category.to_string(),
                    bucket: bucket.parse()?,
                })
            }
            "category" => Ok(BiasKey::category(rest)),
            "fit" => Ok(BiasKey::duration_fit(rest)),
            "task" => Ok(BiasKey::task(rest)),
            other => Err(format!("unsupported bias key kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub task_id: String,
    pub category: String,
    pub action: SuggestionAction,
    pub score: f64,
    pub recorded_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStats {
    pub total: usize,
    pub started: usize,
    pub viewed: usize,
    pub snoozed: usize,
    pub skipped: usize,
    pub acceptance_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_keys_round_trip_through_strings() {
        let keys = [
            BiasKey::affinity("deep:work", HourBucket::Morning),
            BiasKey::category("errands"),
            BiasKey::duration_fit("writing"),
            BiasKey::task("task-1"),
        ];
        for key in keys {
            let parsed: BiasKey = key.to_string().parse().expect("parse");
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn hour_buckets_cover_the_day() {
        assert_eq!(HourBucket::from_hour(3), HourBucket::Night);
        assert_eq!(HourBucket::from_hour(9), HourBucket::Morning);
        assert_eq!(HourBucket::from_hour(14), HourBucket::Afternoon);
        assert_eq!(HourBucket::from_hour(21), HourBucket::Evening);
    }
}
