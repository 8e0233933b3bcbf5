use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::models::interval::TimeInterval;
use crate::models::recurrence::RecurringRule;

pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::None => "none",
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TaskPriority::None),
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            other => Err(format!("unsupported task priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub due_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub estimated_minutes: Option<i64>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub category: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub worked_minutes: i64,
    #[serde(default)]
    pub recurrence: Option<RecurringRule>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub subtask_ids: Vec<String>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl Task {
    pub fn new(title: impl Into<String>, created_at: DateTime<FixedOffset>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            due_at: None,
            estimated_minutes: None,
            priority: TaskPriority::None,
            category: DEFAULT_CATEGORY.to_string(),
            is_completed: false,
            completed_at: None,
            in_progress: false,
            worked_minutes: 0,
            recurrence: None,
            parent_id: None,
            subtask_ids: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_due_at(mut self, due_at: Option<DateTime<FixedOffset>>) -> Self {
        self.due_at = due_at;
        self
    }

    pub fn with_estimated_minutes(mut self, estimated_minutes: Option<i64>) -> Self {
        self.estimated_minutes = estimated_minutes;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_recurrence(mut self, recurrence: Option<RecurringRule>) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_subtasks(mut self, subtask_ids: Vec<String>) -> Self {
        self.subtask_ids = subtask_ids;
        self
    }

    pub fn with_in_progress(mut self, in_progress: bool) -> Self {
        self.in_progress = in_progress;
        self
    }

    pub fn mark_completed(&mut self, at: DateTime<FixedOffset>) {
        self.is_completed = true;
        self.completed_at = Some(at);
        self.in_progress = false;
        self.updated_at = at;
    }

    /// `[due_at, due_at + estimated_minutes)` when both are known and the
    /// duration is positive.
    pub fn scheduled_interval(&self) -> Option<TimeInterval> {
        let due = self.due_at?;
        let minutes = self.estimated_minutes.filter(|minutes| *minutes > 0)?;
        TimeInterval::from_minutes(due, minutes).ok()
    }

    pub fn is_overdue(&self, now: DateTime<FixedOffset>) -> bool {
        !self.is_completed && self.due_at.map(|due| due < now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 5, 1, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(TaskPriority::None < TaskPriority::Low);
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::High);
        assert_eq!("medium".parse::<TaskPriority>(), Ok(TaskPriority::Medium));
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn scheduled_interval_requires_due_and_positive_duration() {
        let task = Task::new("Write report", noon());
        assert!(task.scheduled_interval().is_none());

        let task = task.with_due_at(Some(noon())).with_estimated_minutes(Some(0));
        assert!(task.scheduled_interval().is_none());

        let task = task.with_estimated_minutes(Some(45));
        let interval = task.scheduled_interval().expect("interval");
        assert_eq!(interval.duration_minutes(), 45);
        assert_eq!(interval.start(), noon());
    }

    #[test]
    fn completed_tasks_are_never_overdue() {
        let mut task = Task::new("Pay rent", noon()).with_due_at(Some(noon()));
        let later = noon() + chrono::Duration::hours(3);
        assert!(task.is_overdue(later));
        task.mark_completed(later);
        assert!(!task.is_overdue(later));
    }
}
