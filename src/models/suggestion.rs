use serde::{Deserialize, Serialize};

use crate::models::task::Task;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SuggestionConfidence {
    Recommended,
    GoodFit,
    Consider,
}

impl SuggestionConfidence {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            SuggestionConfidence::Recommended
        } else if score >= 50.0 {
            SuggestionConfidence::GoodFit
        } else {
            SuggestionConfidence::Consider
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SuggestionConfidence::Recommended => "Recommended",
            SuggestionConfidence::GoodFit => "Good fit",
            SuggestionConfidence::Consider => "Consider",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSuggestion {
    pub task: Task,
    pub score: f64,
    pub confidence: SuggestionConfidence,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
}
