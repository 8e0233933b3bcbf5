use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::calendar::CalendarEvent;
use crate::models::interval::TimeInterval;
use crate::models::task::Task;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictSeverity::Low => "low",
            ConflictSeverity::Medium => "medium",
            ConflictSeverity::High => "high",
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a task collides with. Exactly one of an event or another task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind", content = "item")]
pub enum ConflictCounterpart {
    Event(CalendarEvent),
    Task(Task),
}

impl ConflictCounterpart {
    pub fn id(&self) -> &str {
        match self {
            ConflictCounterpart::Event(event) => &event.id,
            ConflictCounterpart::Task(task) => &task.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ConflictCounterpart::Event(event) => &event.title,
            ConflictCounterpart::Task(task) => &task.title,
        }
    }

    pub fn interval(&self) -> Option<TimeInterval> {
        match self {
            ConflictCounterpart::Event(event) => event.interval(),
            ConflictCounterpart::Task(task) => task.scheduled_interval(),
        }
    }

    pub fn key(&self) -> String {
        match self {
            ConflictCounterpart::Event(event) => format!("event:{}", event.id),
            ConflictCounterpart::Task(task) => format!("task:{}", task.id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub task: Task,
    pub counterpart: ConflictCounterpart,
    pub overlap: TimeInterval,
    pub severity: ConflictSeverity,
}

impl Conflict {
    pub fn id(&self) -> String {
        format!("{}|{}", self.task.id, self.counterpart.key())
    }

    pub fn message(&self) -> String {
        format!(
            "\"{}\" overlaps \"{}\" for {} minutes",
            self.task.title,
            self.counterpart.title(),
            self.overlap.duration_minutes()
        )
    }
}
