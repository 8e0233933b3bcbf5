use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use tracing::info;

use crate::error::AppResult;
use crate::models::conflict::Conflict;
use crate::models::reschedule::{BatchRescheduleSuggestion, RescheduleSuggestion};
use crate::models::task::Task;
use crate::services::reschedule_suggester::RescheduleSuggester;

use super::{AppState, ScheduleSnapshot};

impl AppState {
    /// Reads tasks and calendar events afresh and rescans for conflicts.
    /// Every query below starts here, so none of them sees a stale schedule.
    pub async fn refresh(&self, now: DateTime<FixedOffset>) -> AppResult<ScheduleSnapshot> {
        let tasks = self.visible_tasks()?;
        let scan = self
            .detector
            .scan_with_calendar(&tasks, self.calendar.as_ref(), now)
            .await?;

        let snapshot = ScheduleSnapshot {
            tasks,
            events: scan.events,
            conflicts: scan.conflicts,
            calendar_available: scan.calendar_available,
            refreshed_at: now,
        };
        self.store_snapshot(snapshot.clone())?;

        info!(
            target: "app::state",
            tasks = snapshot.tasks.len(),
            events = snapshot.events.len(),
            conflicts = snapshot.conflicts.len(),
            calendar_available = snapshot.calendar_available,
            "schedule refreshed"
        );

        Ok(snapshot)
    }

    pub async fn scan_for_conflicts(&self, now: DateTime<FixedOffset>) -> AppResult<Vec<Conflict>> {
        Ok(self.refresh(now).await?.conflicts)
    }

    pub async fn suggest_reschedule(
        &self,
        conflict: &Conflict,
        now: DateTime<FixedOffset>,
    ) -> AppResult<RescheduleSuggestion> {
        let snapshot = self.refresh(now).await?;
        let suggester = self.suggester(&snapshot, now)?;
        Ok(suggester.suggest_reschedule(conflict))
    }

    /// Batch proposal for every conflict in a fresh scan.
    pub async fn suggest_batch_reschedule(
        &self,
        now: DateTime<FixedOffset>,
    ) -> AppResult<BatchRescheduleSuggestion> {
        let snapshot = self.refresh(now).await?;
        let suggester = self.suggester(&snapshot, now)?;
        Ok(suggester.suggest_batch_reschedule(&snapshot.conflicts))
    }

    /// Writes every accepted move in one batch and returns the moved tasks.
    pub fn apply_batch_reschedule(
        &self,
        batch: &BatchRescheduleSuggestion,
        now: DateTime<FixedOffset>,
    ) -> AppResult<Vec<Task>> {
        let accepted: HashSet<&str> = batch
            .accepted
            .iter()
            .map(|entry| entry.task_id.as_str())
            .collect();

        let tasks = self.visible_tasks()?;
        let moved: Vec<Task> = batch
            .apply_to(&tasks)
            .into_iter()
            .filter(|task| accepted.contains(task.id.as_str()))
            .map(|mut task| {
                task.updated_at = now;
                task
            })
            .collect();

        if moved.is_empty() {
            return Ok(moved);
        }

        self.task_store.update_batch(&moved)?;
        self.invalidate_snapshot()?;

        info!(target: "app::state", moved = moved.len(), "batch reschedule applied");
        Ok(moved)
    }

    fn suggester(
        &self,
        snapshot: &ScheduleSnapshot,
        now: DateTime<FixedOffset>,
    ) -> AppResult<RescheduleSuggester> {
        Ok(RescheduleSuggester::new(
            &snapshot.tasks,
            &snapshot.events,
            now,
            self.workday()?,
        ))
    }
}
