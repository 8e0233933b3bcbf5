use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, FixedOffset, NaiveTime};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::feedback::{
    BiasKey, FeedbackRecord, FeedbackStats, HourBucket, SuggestionAction,
};
use crate::models::settings::WorkdayWindow;
use crate::models::task::Task;
use crate::services::providers::BiasRepository;
use crate::services::schedule_utils::{at_time, start_of_next_day};

pub const LEARNING_RATE: f64 = 0.3;
pub const HISTORY_LIMIT: usize = 200;

const EVENING_HOUR: u32 = 18;

/// Read-only view of the learned state used by one scoring pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiasSnapshot {
    values: HashMap<BiasKey, f64>,
    snoozed_until: HashMap<String, DateTime<FixedOffset>>,
}

impl BiasSnapshot {
    pub fn new(
        values: HashMap<BiasKey, f64>,
        snoozed_until: HashMap<String, DateTime<FixedOffset>>,
    ) -> Self {
        Self {
            values,
            snoozed_until,
        }
    }

    /// Missing terms read as neutral.
    pub fn value(&self, key: &BiasKey) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    pub fn affinity(&self, category: &str, bucket: HourBucket) -> f64 {
        self.value(&BiasKey::affinity(category, bucket))
    }

    pub fn category(&self, category: &str) -> f64 {
        self.value(&BiasKey::category(category))
    }

    pub fn duration_fit(&self, category: &str) -> f64 {
        self.value(&BiasKey::duration_fit(category))
    }

    pub fn task(&self, task_id: &str) -> f64 {
        self.value(&BiasKey::task(task_id))
    }

    pub fn is_snoozed(&self, task_id: &str, now: DateTime<FixedOffset>) -> bool {
        self.snoozed_until
            .get(task_id)
            .map(|until| *until > now)
            .unwrap_or(false)
    }
}

struct LearnerState {
    workday: WorkdayWindow,
    snoozed_until: HashMap<String, DateTime<FixedOffset>>,
    history: VecDeque<FeedbackRecord>,
}

/// Turns reactions to suggestions into decayed bias terms. Every
/// read-modify-write runs while holding `state`.
pub struct FeedbackLearner {
    repository: Arc<dyn BiasRepository>,
    state: Mutex<LearnerState>,
}

impl FeedbackLearner {
    pub fn new(repository: Arc<dyn BiasRepository>, workday: WorkdayWindow) -> Self {
        Self {
            repository,
            state: Mutex::new(LearnerState {
                workday,
                snoozed_until: HashMap::new(),
                history: VecDeque::with_capacity(HISTORY_LIMIT),
            }),
        }
    }

    pub fn set_workday(&self, workday: WorkdayWindow) -> AppResult<()> {
        self.lock()?.workday = workday;
        Ok(())
    }

    pub fn record_suggestion_feedback(
        &self,
        task: &Task,
        action: SuggestionAction,
        score: f64,
        now: DateTime<FixedOffset>,
    ) -> AppResult<()> {
        let mut state = self.lock()?;

        let bucket = HourBucket::of(now);
        let category = task.category.as_str();
        let signals: Vec<(BiasKey, f64)> = match action {
            SuggestionAction::StartedImmediately => vec![
                (BiasKey::affinity(category, bucket), 1.0),
                (BiasKey::category(category), 0.5),
                (BiasKey::task(&task.id), 1.0),
            ],
            SuggestionAction::ViewedDetails => vec![(BiasKey::affinity(category, bucket), 0.3)],
            SuggestionAction::Snoozed1Hour
            | SuggestionAction::SnoozedEvening
            | SuggestionAction::SnoozedTomorrow => vec![(BiasKey::task(&task.id), -0.2)],
            SuggestionAction::SkippedNotRelevant => vec![
                (BiasKey::category(category), -1.0),
                (BiasKey::task(&task.id), -1.0),
            ],
            SuggestionAction::SkippedWrongTime => vec![(BiasKey::affinity(category, bucket), -1.0)],
            SuggestionAction::SkippedNeedsFocus => vec![(BiasKey::duration_fit(category), -1.0)],
        };

        for (key, signal) in &signals {
            let previous = self.repository.get(key)?.unwrap_or(0.0);
            let updated = blend(previous, *signal);
            self.repository.set(key, updated)?;
            debug!(
                target: "app::feedback",
                key = %key,
                previous,
                updated,
                "bias term updated"
            );
        }

        if action.is_snooze() {
            let until = snooze_until(action, now, state.workday)?;
            state.snoozed_until.insert(task.id.clone(), until);
            debug!(target: "app::feedback", task_id = %task.id, until = %until, "task snoozed");
        } else if action == SuggestionAction::StartedImmediately {
            state.snoozed_until.remove(&task.id);
        }

        if state.history.len() == HISTORY_LIMIT {
            state.history.pop_front();
        }
        state.history.push_back(FeedbackRecord {
            task_id: task.id.clone(),
            category: task.category.clone(),
            action,
            score,
            recorded_at: now,
        });

        info!(
            target: "app::feedback",
            task_id = %task.id,
            action = %action,
            score,
            "suggestion feedback recorded"
        );

        Ok(())
    }

    pub fn snapshot(&self) -> AppResult<BiasSnapshot> {
        let state = self.lock()?;
        let values = self.repository.list()?.into_iter().collect();
        Ok(BiasSnapshot::new(values, state.snoozed_until.clone()))
    }

    pub fn is_snoozed(&self, task_id: &str, now: DateTime<FixedOffset>) -> AppResult<bool> {
        let state = self.lock()?;
        Ok(state
            .snoozed_until
            .get(task_id)
            .map(|until| *until > now)
            .unwrap_or(false))
    }

    pub fn clear_snooze(&self, task_id: &str) -> AppResult<bool> {
        Ok(self.lock()?.snoozed_until.remove(task_id).is_some())
    }

    /// Most recent first.
    pub fn history(&self) -> AppResult<Vec<FeedbackRecord>> {
        let state = self.lock()?;
        Ok(state.history.iter().rev().cloned().collect())
    }

    pub fn feedback_stats(&self) -> AppResult<FeedbackStats> {
        let state = self.lock()?;
        let mut stats = FeedbackStats {
            total: state.history.len(),
            ..FeedbackStats::default()
        };

        for record in &state.history {
            match record.action {
                SuggestionAction::StartedImmediately => stats.started += 1,
                SuggestionAction::ViewedDetails => stats.viewed += 1,
                action if action.is_snooze() => stats.snoozed += 1,
                _ => stats.skipped += 1,
            }
        }

        if stats.total > 0 {
            stats.acceptance_rate = stats.started as f64 / stats.total as f64;
        }

        Ok(stats)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, LearnerState>> {
        self.state
            .lock()
            .map_err(|_| AppError::other("feedback learner lock poisoned"))
    }
}

/// Exponential moving average toward `signal`, kept within `[-1, 1]`.
fn blend(previous: f64, signal: f64) -> f64 {
    (previous * (1.0 - LEARNING_RATE) + signal * LEARNING_RATE).clamp(-1.0, 1.0)
}

fn snooze_until(
    action: SuggestionAction,
    now: DateTime<FixedOffset>,
    workday: WorkdayWindow,
) -> AppResult<DateTime<FixedOffset>> {
    let in_an_hour = now + Duration::hours(1);
    match action {
        SuggestionAction::SnoozedEvening => {
            let evening = NaiveTime::from_hms_opt(EVENING_HOUR, 0, 0)
                .map(|time| at_time(now, time))
                .unwrap_or(in_an_hour);
            Ok(if evening > now { evening } else { in_an_hour })
        }
        SuggestionAction::SnoozedTomorrow => Ok(workday.start_on(start_of_next_day(now)?)),
        _ => Ok(in_an_hour),
    }
}
