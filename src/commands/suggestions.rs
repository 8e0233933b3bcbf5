use chrono::{DateTime, FixedOffset};

use crate::error::AppResult;
use crate::models::feedback::{FeedbackStats, SuggestionAction};
use crate::models::suggestion::TaskSuggestion;
use crate::services::insight_service::InsightEnricher;
use crate::services::prioritization_engine::PrioritizationEngine;

use super::AppState;

impl AppState {
    pub async fn get_next_task_suggestion(
        &self,
        now: DateTime<FixedOffset>,
    ) -> AppResult<Option<TaskSuggestion>> {
        Ok(self.ranked_suggestions(now).await?.into_iter().next())
    }

    pub async fn get_top_three_suggestions(
        &self,
        now: DateTime<FixedOffset>,
    ) -> AppResult<Vec<TaskSuggestion>> {
        let mut ranked = self.ranked_suggestions(now).await?;
        ranked.truncate(3);
        Ok(ranked)
    }

    /// Top three with optional insight text. Ranking is settled before the
    /// provider is consulted; without a provider this equals
    /// [`AppState::get_top_three_suggestions`].
    pub async fn get_top_three_with_insights(
        &self,
        now: DateTime<FixedOffset>,
    ) -> AppResult<Vec<TaskSuggestion>> {
        let suggestions = self.get_top_three_suggestions(now).await?;
        let Some(provider) = self.insight_provider.clone() else {
            return Ok(suggestions);
        };

        let timeout = self.read_settings()?.insight_timeout();
        let enricher = InsightEnricher::new(provider, timeout);
        Ok(enricher.enrich(suggestions).await)
    }

    pub fn record_suggestion_feedback(
        &self,
        task_id: &str,
        action: SuggestionAction,
        score: f64,
        now: DateTime<FixedOffset>,
    ) -> AppResult<()> {
        let task = self.find_visible_task(task_id)?;
        self.feedback_learner
            .record_suggestion_feedback(&task, action, score, now)
    }

    pub fn feedback_stats(&self) -> AppResult<FeedbackStats> {
        self.feedback_learner.feedback_stats()
    }

    async fn ranked_suggestions(&self, now: DateTime<FixedOffset>) -> AppResult<Vec<TaskSuggestion>> {
        let snapshot = self.refresh(now).await?;
        let bias = self.feedback_learner.snapshot()?;
        let engine = PrioritizationEngine::new(self.workday()?);
        Ok(engine.rank_suggestions(&snapshot.tasks, &snapshot.events, &bias, now))
    }
}
