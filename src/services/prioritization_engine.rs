use std::cmp::Ordering;

use chrono::{DateTime, Duration, FixedOffset};
use tracing::debug;

use crate::models::calendar::CalendarEvent;
use crate::models::feedback::HourBucket;
use crate::models::interval::TimeInterval;
use crate::models::settings::WorkdayWindow;
use crate::models::suggestion::{SuggestionConfidence, TaskSuggestion};
use crate::models::task::{Task, TaskPriority};
use crate::services::conflict_detector::qualifying_tasks;
use crate::services::feedback_learner::BiasSnapshot;
use crate::services::schedule_utils::{busy_minutes_within, same_day};

const BASE_SCORE: f64 = 10.0;
const OVERDUE_BASE: f64 = 10.0;
const OVERDUE_PER_DAY: f64 = 5.0;
const OVERDUE_CAP: f64 = 30.0;
const DUE_TODAY: f64 = 15.0;
const DUE_THIS_WEEK: f64 = 8.0;
const FIT_WEIGHT: f64 = 10.0;
const AFFINITY_WEIGHT: f64 = 15.0;
const HISTORY_WEIGHT: f64 = 10.0;
const IN_PROGRESS_BONUS: f64 = 8.0;
const REASON_THRESHOLD: f64 = 5.0;
const DEFAULT_TASK_MINUTES: i64 = 30;

/// One contribution to a suggestion score together with the phrase shown
/// to the user when it matters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTerm {
    pub value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PrioritizationEngine {
    workday: WorkdayWindow,
}

impl PrioritizationEngine {
    pub fn new(workday: WorkdayWindow) -> Self {
        Self { workday }
    }

    pub fn get_next_task_suggestion(
        &self,
        tasks: &[Task],
        events: &[CalendarEvent],
        bias: &BiasSnapshot,
        now: DateTime<FixedOffset>,
    ) -> Option<TaskSuggestion> {
        self.rank_suggestions(tasks, events, bias, now)
            .into_iter()
            .next()
    }

    pub fn get_top_three_suggestions(
        &self,
        tasks: &[Task],
        events: &[CalendarEvent],
        bias: &BiasSnapshot,
        now: DateTime<FixedOffset>,
    ) -> Vec<TaskSuggestion> {
        let mut ranked = self.rank_suggestions(tasks, events, bias, now);
        ranked.truncate(3);
        ranked
    }

    /// Every eligible task, best first.
    pub fn rank_suggestions(
        &self,
        tasks: &[Task],
        events: &[CalendarEvent],
        bias: &BiasSnapshot,
        now: DateTime<FixedOffset>,
    ) -> Vec<TaskSuggestion> {
        let free_minutes = self.free_minutes_today(tasks, events, now);

        let mut suggestions: Vec<TaskSuggestion> = tasks
            .iter()
            .filter(|task| !task.is_completed)
            .filter(|task| {
                let snoozed = bias.is_snoozed(&task.id, now);
                if snoozed {
                    debug!(target: "app::suggestions", task_id = %task.id, "snoozed task skipped");
                }
                !snoozed
            })
            .map(|task| self.score_task(task, free_minutes, bias, now))
            .collect();

        suggestions.sort_by(compare_suggestions);

        debug!(
            target: "app::suggestions",
            candidates = suggestions.len(),
            free_minutes,
            "suggestions ranked"
        );

        suggestions
    }

    pub fn score_task(
        &self,
        task: &Task,
        free_minutes: i64,
        bias: &BiasSnapshot,
        now: DateTime<FixedOffset>,
    ) -> TaskSuggestion {
        let terms = score_terms(task, free_minutes, bias, now);
        let raw = BASE_SCORE + terms.iter().map(|term| term.value).sum::<f64>();
        let score = raw.clamp(0.0, 100.0);

        let mut notable: Vec<&ScoreTerm> = terms
            .iter()
            .filter(|term| term.value.abs() >= REASON_THRESHOLD)
            .collect();
        notable.sort_by(|a, b| {
            b.value
                .abs()
                .partial_cmp(&a.value.abs())
                .unwrap_or(Ordering::Equal)
        });

        TaskSuggestion {
            task: task.clone(),
            score,
            confidence: SuggestionConfidence::from_score(score),
            reasons: notable.into_iter().map(|term| term.reason.clone()).collect(),
            insight: None,
        }
    }

    /// Minutes left between `max(now, workday start)` and the workday end that
    /// no event or scheduled task occupies.
    pub fn free_minutes_today(
        &self,
        tasks: &[Task],
        events: &[CalendarEvent],
        now: DateTime<FixedOffset>,
    ) -> i64 {
        let start = now.max(self.workday.start_on(now));
        let end = self.workday.end_on(now);
        let Ok(window) = TimeInterval::new(start, end) else {
            return 0;
        };

        let mut busy: Vec<TimeInterval> = events.iter().filter_map(CalendarEvent::interval).collect();
        busy.extend(qualifying_tasks(tasks).into_iter().map(|(_, interval)| interval));

        (window.duration_minutes() - busy_minutes_within(&window, &busy)).max(0)
    }
}

fn score_terms(
    task: &Task,
    free_minutes: i64,
    bias: &BiasSnapshot,
    now: DateTime<FixedOffset>,
) -> Vec<ScoreTerm> {
    let mut terms = Vec::with_capacity(7);

    let priority = match task.priority {
        TaskPriority::None => 0.0,
        TaskPriority::Low => 10.0,
        TaskPriority::Medium => 20.0,
        TaskPriority::High => 30.0,
    };
    terms.push(ScoreTerm {
        value: priority,
        reason: format!("{} priority", capitalize(task.priority.as_str())),
    });

    if let Some(due) = task.due_at {
        if due < now {
            let days = (now - due).num_days();
            terms.push(ScoreTerm {
                value: (OVERDUE_BASE + OVERDUE_PER_DAY * days as f64).min(OVERDUE_CAP),
                reason: match days {
                    0 => "Overdue".to_string(),
                    1 => "Overdue by 1 day".to_string(),
                    n => format!("Overdue by {n} days"),
                },
            });
        } else if same_day(now, due) {
            terms.push(ScoreTerm {
                value: DUE_TODAY,
                reason: "Due today".to_string(),
            });
        } else if due - now <= Duration::days(7) {
            terms.push(ScoreTerm {
                value: DUE_THIS_WEEK,
                reason: "Due this week".to_string(),
            });
        }
    }

    let fit_bias = bias.duration_fit(&task.category);
    let needed = (task.estimated_minutes.unwrap_or(DEFAULT_TASK_MINUTES) - task.worked_minutes).max(0);
    if needed <= free_minutes {
        terms.push(ScoreTerm {
            value: FIT_WEIGHT * (1.0 + fit_bias),
            reason: "Fits your free time".to_string(),
        });
    } else {
        terms.push(ScoreTerm {
            value: FIT_WEIGHT * fit_bias,
            reason: "Longer than your free time today".to_string(),
        });
    }

    let bucket = HourBucket::of(now);
    let affinity = AFFINITY_WEIGHT
        * (0.6 * bias.affinity(&task.category, bucket) + 0.4 * bias.category(&task.category));
    terms.push(ScoreTerm {
        value: affinity,
        reason: if affinity >= 0.0 {
            format!("Good time for {}", task.category)
        } else {
            format!("You rarely do {} at this time", task.category)
        },
    });

    let history = HISTORY_WEIGHT * bias.task(&task.id);
    terms.push(ScoreTerm {
        value: history,
        reason: if history >= 0.0 {
            "You usually start this right away".to_string()
        } else {
            "Often skipped".to_string()
        },
    });

    if task.in_progress {
        terms.push(ScoreTerm {
            value: IN_PROGRESS_BONUS,
            reason: "Already in progress".to_string(),
        });
    }

    terms
}

fn compare_suggestions(a: &TaskSuggestion, b: &TaskSuggestion) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.task.due_at, b.task.due_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.task.created_at.cmp(&b.task.created_at))
        .then_with(|| a.task.id.cmp(&b.task.id))
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feedback::BiasKey;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn dt(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 3, day, hour, 0, 0)
            .unwrap()
    }

    fn engine() -> PrioritizationEngine {
        PrioritizationEngine::new(WorkdayWindow::default())
    }

    fn task(id: &str) -> Task {
        Task::new(id, dt(1, 8)).with_id(id).with_estimated_minutes(Some(30))
    }

    #[test]
    fn scores_stay_within_bounds() {
        let now = dt(10, 10);
        let mut values = HashMap::new();
        values.insert(BiasKey::affinity("general", HourBucket::Morning), 1.0);
        values.insert(BiasKey::category("general"), 1.0);
        values.insert(BiasKey::duration_fit("general"), 1.0);
        values.insert(BiasKey::task("max"), 1.0);
        values.insert(BiasKey::task("min"), -1.0);
        values.insert(BiasKey::affinity("idle", HourBucket::Morning), -1.0);
        values.insert(BiasKey::category("idle"), -1.0);
        values.insert(BiasKey::duration_fit("idle"), -1.0);
        let bias = BiasSnapshot::new(values, HashMap::new());

        let tasks = vec![
            task("max")
                .with_priority(TaskPriority::High)
                .with_due_at(Some(dt(1, 9)))
                .with_in_progress(true),
            task("min")
                .with_category("idle")
                .with_estimated_minutes(Some(10_000)),
        ];

        let ranked = engine().rank_suggestions(&tasks, &[], &bias, now);
        assert_eq!(ranked[0].task.id, "max");
        assert_eq!(ranked[0].score, 100.0);
        assert_eq!(ranked[0].confidence, SuggestionConfidence::Recommended);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn longer_overdue_never_scores_lower() {
        let now = dt(20, 10);
        let bias = BiasSnapshot::default();
        let mut previous = 0.0;
        for days in 0..10 {
            let overdue = task("t").with_due_at(Some(now - Duration::days(days) - Duration::hours(1)));
            let score = engine().score_task(&overdue, 120, &bias, now).score;
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn reasons_are_ordered_by_weight() {
        let now = dt(10, 10);
        let task = task("t")
            .with_priority(TaskPriority::High)
            .with_due_at(Some(dt(10, 16)));

        let suggestion = engine().score_task(&task, 240, &BiasSnapshot::default(), now);

        assert_eq!(
            suggestion.reasons,
            vec!["High priority", "Due today", "Fits your free time"]
        );
        assert_eq!(suggestion.score, 10.0 + 30.0 + 15.0 + 10.0);
    }

    #[test]
    fn free_time_excludes_busy_blocks_and_elapsed_time() {
        let now = dt(10, 13);
        let events = vec![CalendarEvent::new("e", "Workshop", dt(10, 14), dt(10, 16))];
        let tasks = vec![task("scheduled").with_due_at(Some(dt(10, 16)))];

        // 13:00 -> 18:00 is 300 minutes, minus 120 for the event and 30 for the task.
        assert_eq!(engine().free_minutes_today(&tasks, &events, now), 150);
        assert_eq!(engine().free_minutes_today(&tasks, &events, dt(10, 19)), 0);
    }

    #[test]
    fn completed_and_snoozed_tasks_are_not_suggested() {
        let now = dt(10, 10);
        let mut done = task("done");
        done.mark_completed(dt(9, 10));
        let mut snoozes = HashMap::new();
        snoozes.insert("later".to_string(), dt(10, 11));
        let bias = BiasSnapshot::new(HashMap::new(), snoozes);

        let tasks = vec![done, task("later"), task("now")];
        let next = engine()
            .get_next_task_suggestion(&tasks, &[], &bias, now)
            .expect("one task left");
        assert_eq!(next.task.id, "now");
        assert_eq!(engine().get_top_three_suggestions(&tasks, &[], &bias, now).len(), 1);
    }

    #[test]
    fn ties_prefer_earlier_due_then_creation() {
        let now = dt(10, 10);
        let bias = BiasSnapshot::default();
        let tasks = vec![
            Task::new("b", dt(2, 8)).with_id("b"),
            Task::new("a", dt(3, 8)).with_id("a"),
            Task::new("c", dt(1, 8)).with_id("c").with_due_at(Some(dt(25, 9))),
        ];

        let order: Vec<String> = engine()
            .rank_suggestions(&tasks, &[], &bias, now)
            .into_iter()
            .map(|suggestion| suggestion.task.id)
            .collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }
}
