use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::recurrence::RecurringRule;
use crate::models::task::Task;
use crate::services::mutation_staging::{DeleteOutcome, StagedMutation};

use super::AppState;

/// A completed task and, for recurring ones, the instance created in its place.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub completed: Task,
    pub follow_up: Option<Task>,
}

impl AppState {
    pub fn next_occurrences(
        &self,
        rule: &RecurringRule,
        after: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> Vec<DateTime<FixedOffset>> {
        self.expander.next_occurrences(rule, after, until)
    }

    /// Marks the task completed; a recurring task gets its next instance
    /// written in the same batch.
    pub fn complete_task(&self, task_id: &str, now: DateTime<FixedOffset>) -> AppResult<TaskCompletion> {
        let mut task = self.find_visible_task(task_id)?;
        if task.is_completed {
            return Err(AppError::conflict(format!("task {task_id} is already completed")));
        }
        task.mark_completed(now);

        let follow_up = self.expander.materialize_next(&task, now);
        let mut writes = vec![task.clone()];
        if let Some(next) = &follow_up {
            writes.push(next.clone());
        }
        self.task_store.update_batch(&writes)?;
        self.invalidate_snapshot()?;

        info!(
            target: "app::state",
            task_id,
            follow_up = follow_up.as_ref().map(|next| next.id.as_str()),
            "task completed"
        );

        Ok(TaskCompletion {
            completed: task,
            follow_up,
        })
    }

    pub fn delete_task(&self, task_id: &str, allow_undo: bool) -> AppResult<DeleteOutcome> {
        let outcome = self.staging.delete_task(task_id, allow_undo)?;
        self.invalidate_snapshot()?;
        Ok(outcome)
    }

    pub fn discard_pending_changes(&self) -> AppResult<StagedMutation> {
        let mutation = self.staging.discard_pending_changes()?;
        self.invalidate_snapshot()?;
        Ok(mutation)
    }

    pub fn commit_pending_changes(&self) -> AppResult<StagedMutation> {
        let mutation = self.staging.commit_pending_changes()?;
        self.invalidate_snapshot()?;
        Ok(mutation)
    }

    pub fn pending_change(&self) -> AppResult<Option<StagedMutation>> {
        self.staging.pending()
    }
}
