use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::conflict::Conflict;
use crate::models::interval::TimeInterval;
use crate::models::task::Task;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RescheduleKind {
    AfterCounterpart,
    NextDaySameTime,
    PushToTomorrow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleOption {
    pub start_at: DateTime<FixedOffset>,
    pub duration_minutes: i64,
    pub reason: String,
    pub score: f64,
    pub kind: RescheduleKind,
}

impl RescheduleOption {
    pub fn interval(&self) -> AppResult<TimeInterval> {
        TimeInterval::from_minutes(self.start_at, self.duration_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleSuggestion {
    pub conflict: Conflict,
    pub options: Vec<RescheduleOption>,
    pub recommended_option: Option<RescheduleOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedOption {
    pub task_id: String,
    pub option: RescheduleOption,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchRescheduleSuggestion {
    pub suggestions: Vec<RescheduleSuggestion>,
    pub accepted: Vec<AcceptedOption>,
    pub unresolved_task_ids: Vec<String>,
    pub can_auto_resolve: bool,
}

impl BatchRescheduleSuggestion {
    /// Copies of `tasks` with every accepted option applied as the new due time.
    pub fn apply_to(&self, tasks: &[Task]) -> Vec<Task> {
        let moves: HashMap<&str, &RescheduleOption> = self
            .accepted
            .iter()
            .map(|entry| (entry.task_id.as_str(), &entry.option))
            .collect();

        tasks
            .iter()
            .map(|task| match moves.get(task.id.as_str()) {
                Some(option) => {
                    let mut moved = task.clone();
                    moved.due_at = Some(option.start_at);
                    moved.estimated_minutes = Some(option.duration_minutes);
                    moved
                }
                None => task.clone(),
            })
            .collect()
    }
}
