use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::settings::SchedulingSettings;
use crate::services::settings_service::SettingsUpdateInput;

use super::AppState;

impl AppState {
    pub fn settings(&self) -> AppResult<SchedulingSettings> {
        Ok(self.read_settings()?.clone())
    }

    /// Persists the change and pushes the new values into the learner and
    /// the staging area. A delete that is already staged keeps its window.
    pub fn update_settings(&self, input: SettingsUpdateInput) -> AppResult<SchedulingSettings> {
        let service = self
            .settings_service
            .as_ref()
            .ok_or_else(|| AppError::other("settings are not persisted for this state"))?;
        let updated = service.update(input)?;

        self.feedback_learner.set_workday(updated.workday())?;
        self.staging
            .reconfigure(updated.undo_grace(), updated.pending_mutation_policy);
        *self.write_settings()? = updated.clone();

        info!(
            target: "app::state",
            workday_start = updated.workday_start_minute,
            workday_end = updated.workday_end_minute,
            "scheduling settings applied"
        );
        Ok(updated)
    }
}
