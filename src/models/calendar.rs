use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::models::interval::TimeInterval;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_at: DateTime<FixedOffset>,
    pub end_at: DateTime<FixedOffset>,
}

impl CalendarEvent {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start_at: DateTime<FixedOffset>,
        end_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start_at,
            end_at,
        }
    }

    /// `None` for malformed events whose end does not follow their start.
    pub fn interval(&self) -> Option<TimeInterval> {
        TimeInterval::new(self.start_at, self.end_at).ok()
    }
}
