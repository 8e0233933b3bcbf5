//! Interfaces to the collaborators this subsystem consumes but does not own.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::error::AppResult;
use crate::models::calendar::CalendarEvent;
use crate::models::feedback::BiasKey;
use crate::models::task::Task;

/// Source of calendar commitments. Failures (permission denied, fetch
/// errors) are reported as errors and handled by the caller.
#[async_trait]
pub trait CalendarAccessProvider: Send + Sync {
    async fn events_in_range(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> AppResult<Vec<CalendarEvent>>;
}

/// Backing store and sole source of truth for tasks.
pub trait TaskStore: Send + Sync {
    fn create(&self, task: &Task) -> AppResult<()>;

    fn update(&self, task: &Task) -> AppResult<()>;

    /// Writes every task (inserting missing ones) as a single atomic unit.
    fn update_batch(&self, tasks: &[Task]) -> AppResult<()>;

    /// Permanent removal; undo is handled above the store.
    fn delete(&self, ids: &[String]) -> AppResult<()>;

    fn list_current(&self) -> AppResult<Vec<Task>>;
}

/// Optional explanatory text for a suggestion. Implementations swallow their
/// own failures and answer `None`.
#[async_trait]
pub trait AiInsightProvider: Send + Sync {
    async fn insight(&self, task: &Task) -> Option<String>;
}

/// Key/value storage for learned bias terms.
pub trait BiasRepository: Send + Sync {
    fn get(&self, key: &BiasKey) -> AppResult<Option<f64>>;

    fn set(&self, key: &BiasKey, value: f64) -> AppResult<()>;

    fn list(&self) -> AppResult<Vec<(BiasKey, f64)>>;
}
