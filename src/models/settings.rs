use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// What happens when a second undoable delete arrives while one is staged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PendingMutationPolicy {
    #[default]
    ForceCommitPrior,
    Reject,
}

impl PendingMutationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingMutationPolicy::ForceCommitPrior => "force_commit_prior",
            PendingMutationPolicy::Reject => "reject",
        }
    }
}

impl fmt::Display for PendingMutationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingMutationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "force_commit_prior" => Ok(PendingMutationPolicy::ForceCommitPrior),
            "reject" => Ok(PendingMutationPolicy::Reject),
            other => Err(format!("unsupported pending mutation policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingSettings {
    pub workday_start_minute: i16,
    pub workday_end_minute: i16,
    pub undo_grace_seconds: u32,
    pub insight_timeout_ms: u64,
    pub pending_mutation_policy: PendingMutationPolicy,
    pub updated_at: String,
}

impl SchedulingSettings {
    pub fn workday(&self) -> WorkdayWindow {
        WorkdayWindow::new(self.workday_start_minute, self.workday_end_minute)
    }
}

/// Daily working window in minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkdayWindow {
    pub start_minute: i16,
    pub end_minute: i16,
}

impl WorkdayWindow {
    pub fn new(start_minute: i16, end_minute: i16) -> Self {
        Self {
            start_minute,
            end_minute,
        }
    }

    pub fn start_on(&self, day: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        at_minute(day, self.start_minute)
    }

    pub fn end_on(&self, day: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        at_minute(day, self.end_minute)
    }
}

impl Default for WorkdayWindow {
    fn default() -> Self {
        Self::new(9 * 60, 18 * 60)
    }
}

/// Same calendar day as `day` (in its own offset) at `minute` past midnight.
fn at_minute(day: DateTime<FixedOffset>, minute: i16) -> DateTime<FixedOffset> {
    let midnight = day.date_naive().and_time(NaiveTime::MIN);
    let local = midnight + Duration::minutes(minute.clamp(0, 1440) as i64);
    day.offset()
        .from_local_datetime(&local)
        .single()
        .unwrap_or(day)
}
