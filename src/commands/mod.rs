pub mod schedule;
pub mod settings;
pub mod suggestions;
pub mod task;

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use crate::db::repositories::feedback_bias_repository::SqliteBiasRepository;
use crate::db::repositories::task_repository::SqliteTaskStore;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::calendar::CalendarEvent;
use crate::models::conflict::Conflict;
use crate::models::settings::{SchedulingSettings, WorkdayWindow};
use crate::models::task::Task;
use crate::services::conflict_detector::ConflictDetector;
use crate::services::feedback_learner::FeedbackLearner;
use crate::services::mutation_staging::MutationStaging;
use crate::services::providers::{
    AiInsightProvider, BiasRepository, CalendarAccessProvider, TaskStore,
};
use crate::services::recurrence_expander::RecurrenceExpander;
use crate::services::settings_service::SettingsService;

/// Tasks, events and conflicts as seen by the last refresh.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSnapshot {
    pub tasks: Vec<Task>,
    pub events: Vec<CalendarEvent>,
    pub conflicts: Vec<Conflict>,
    pub calendar_available: bool,
    pub refreshed_at: DateTime<FixedOffset>,
}

/// Collaborators for an [`AppState`] that is not backed by SQLite.
pub struct AppStateParts {
    pub task_store: Arc<dyn TaskStore>,
    pub bias_repository: Arc<dyn BiasRepository>,
    pub calendar: Arc<dyn CalendarAccessProvider>,
    pub insight_provider: Option<Arc<dyn AiInsightProvider>>,
    pub settings: SchedulingSettings,
}

#[derive(Clone)]
pub struct AppState {
    db_pool: Option<DbPool>,
    task_store: Arc<dyn TaskStore>,
    calendar: Arc<dyn CalendarAccessProvider>,
    insight_provider: Option<Arc<dyn AiInsightProvider>>,
    settings_service: Option<Arc<SettingsService>>,
    settings: Arc<RwLock<SchedulingSettings>>,
    feedback_learner: Arc<FeedbackLearner>,
    staging: Arc<MutationStaging>,
    detector: ConflictDetector,
    expander: RecurrenceExpander,
    snapshot: Arc<RwLock<Option<ScheduleSnapshot>>>,
}

impl AppState {
    pub fn new(db_pool: DbPool, calendar: Arc<dyn CalendarAccessProvider>) -> AppResult<Self> {
        let settings_service = Arc::new(SettingsService::new(db_pool.clone()));
        let settings = settings_service.get()?;

        let mut state = Self::from_parts(AppStateParts {
            task_store: Arc::new(SqliteTaskStore::new(db_pool.clone())),
            bias_repository: Arc::new(SqliteBiasRepository::new(db_pool.clone())),
            calendar,
            insight_provider: None,
            settings,
        });
        state.db_pool = Some(db_pool);
        state.settings_service = Some(settings_service);
        Ok(state)
    }

    pub fn from_parts(parts: AppStateParts) -> Self {
        let workday = parts.settings.workday();
        let feedback_learner = Arc::new(FeedbackLearner::new(parts.bias_repository, workday));
        let staging = Arc::new(MutationStaging::new(
            Arc::clone(&parts.task_store),
            parts.settings.undo_grace(),
            parts.settings.pending_mutation_policy,
        ));

        Self {
            db_pool: None,
            task_store: parts.task_store,
            calendar: parts.calendar,
            insight_provider: parts.insight_provider,
            settings_service: None,
            settings: Arc::new(RwLock::new(parts.settings)),
            feedback_learner,
            staging,
            detector: ConflictDetector::new(),
            expander: RecurrenceExpander::new(),
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_insight_provider(mut self, provider: Arc<dyn AiInsightProvider>) -> Self {
        self.insight_provider = Some(provider);
        self
    }

    pub fn db(&self) -> Option<DbPool> {
        self.db_pool.clone()
    }

    pub fn task_store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.task_store)
    }

    pub fn feedback(&self) -> Arc<FeedbackLearner> {
        Arc::clone(&self.feedback_learner)
    }

    pub fn staging(&self) -> Arc<MutationStaging> {
        Arc::clone(&self.staging)
    }

    pub fn expander(&self) -> &RecurrenceExpander {
        &self.expander
    }

    /// What the last refresh saw, if nothing has been written since. Queries
    /// never answer from it; each one rereads the store and the calendar.
    pub fn latest_snapshot(&self) -> AppResult<Option<ScheduleSnapshot>> {
        Ok(self.read_snapshot()?.clone())
    }

    fn workday(&self) -> AppResult<WorkdayWindow> {
        Ok(self.read_settings()?.workday())
    }

    /// Current tasks minus any that sit in a staged delete.
    fn visible_tasks(&self) -> AppResult<Vec<Task>> {
        let hidden: HashSet<String> = self.staging.hidden_task_ids()?;
        let tasks = self.task_store.list_current()?;
        if hidden.is_empty() {
            return Ok(tasks);
        }
        debug!(target: "app::state", hidden = hidden.len(), "hiding tasks with a staged delete");
        Ok(tasks
            .into_iter()
            .filter(|task| !hidden.contains(&task.id))
            .collect())
    }

    fn find_visible_task(&self, task_id: &str) -> AppResult<Task> {
        self.visible_tasks()?
            .into_iter()
            .find(|task| task.id == task_id)
            .ok_or_else(AppError::not_found)
    }

    fn store_snapshot(&self, snapshot: ScheduleSnapshot) -> AppResult<()> {
        *self.write_snapshot()? = Some(snapshot);
        Ok(())
    }

    fn invalidate_snapshot(&self) -> AppResult<()> {
        *self.write_snapshot()? = None;
        Ok(())
    }

    fn read_settings(&self) -> AppResult<RwLockReadGuard<'_, SchedulingSettings>> {
        self.settings
            .read()
            .map_err(|_| AppError::other("settings lock poisoned"))
    }

    fn write_settings(&self) -> AppResult<RwLockWriteGuard<'_, SchedulingSettings>> {
        self.settings
            .write()
            .map_err(|_| AppError::other("settings lock poisoned"))
    }

    fn read_snapshot(&self) -> AppResult<RwLockReadGuard<'_, Option<ScheduleSnapshot>>> {
        self.snapshot
            .read()
            .map_err(|_| AppError::other("snapshot lock poisoned"))
    }

    fn write_snapshot(&self) -> AppResult<RwLockWriteGuard<'_, Option<ScheduleSnapshot>>> {
        self.snapshot
            .write()
            .map_err(|_| AppError::other("snapshot lock poisoned"))
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Error shape handed to callers outside the crate.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", message, details),
            AppError::NotFound => CommandError::new("NOT_FOUND", "requested task does not exist", None),
            AppError::Conflict { message } => CommandError::new("CONFLICT", message, None),
            AppError::InvalidRecurrence { violation, message } => CommandError::new(
                "INVALID_RECURRENCE",
                message,
                Some(serde_json::json!({ "violation": violation.as_str() })),
            ),
            AppError::NothingPending => {
                CommandError::new("NOTHING_PENDING", "there is no change to undo", None)
            }
            AppError::CalendarUnavailable(message) => {
                warn!(target: "app::command", %message, "calendar unavailable in command");
                CommandError::new("CALENDAR_UNAVAILABLE", message, None)
            }
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("UNKNOWN", message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "serialization failed", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "file system access failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}
