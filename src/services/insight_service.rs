use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::models::suggestion::TaskSuggestion;
use crate::services::providers::AiInsightProvider;

/// Attaches optional explanatory text to already-ranked suggestions. Scores
/// and reasons are never touched; a slow or failing provider only leaves
/// `insight` empty.
pub struct InsightEnricher {
    provider: Arc<dyn AiInsightProvider>,
    timeout: Duration,
}

impl InsightEnricher {
    pub fn new(provider: Arc<dyn AiInsightProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn enrich(&self, suggestions: Vec<TaskSuggestion>) -> Vec<TaskSuggestion> {
        let lookups = suggestions.iter().map(|suggestion| async move {
            match tokio::time::timeout(self.timeout, self.provider.insight(&suggestion.task)).await {
                Ok(insight) => insight,
                Err(_) => {
                    warn!(
                        target: "app::insight",
                        task_id = %suggestion.task.id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "insight lookup timed out"
                    );
                    None
                }
            }
        });
        let insights = join_all(lookups).await;

        let enriched: Vec<TaskSuggestion> = suggestions
            .into_iter()
            .zip(insights)
            .map(|(mut suggestion, insight)| {
                suggestion.insight = insight.filter(|text| !text.trim().is_empty());
                suggestion
            })
            .collect();

        debug!(
            target: "app::insight",
            suggestions = enriched.len(),
            with_insight = enriched.iter().filter(|s| s.insight.is_some()).count(),
            "suggestions enriched"
        );

        enriched
    }
}
