use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info};

use crate::models::calendar::CalendarEvent;
use crate::models::conflict::Conflict;
use crate::models::interval::TimeInterval;
use crate::models::reschedule::{
    AcceptedOption, BatchRescheduleSuggestion, RescheduleKind, RescheduleOption,
    RescheduleSuggestion,
};
use crate::models::settings::WorkdayWindow;
use crate::models::task::Task;
use crate::services::conflict_detector::qualifying_tasks;
use crate::services::schedule_utils::{add_days, first_free_slot, same_day, start_of_next_day};

const BASE_SCORE: f64 = 100.0;
const SAME_DAY_BONUS: f64 = 20.0;
const DISPLACEMENT_PENALTY_PER_HOUR: f64 = 2.0;
const MAX_DISPLACEMENT_PENALTY: f64 = 40.0;
const BUSY_OVERLAP_PENALTY: f64 = 50.0;

/// Proposes new start times for conflicting tasks against a fixed snapshot of
/// tasks and calendar events.
#[derive(Debug, Clone)]
pub struct RescheduleSuggester {
    busy: Vec<BusyBlock>,
    now: DateTime<FixedOffset>,
    workday: WorkdayWindow,
}

#[derive(Debug, Clone)]
struct BusyBlock {
    owner: String,
    interval: TimeInterval,
}

impl RescheduleSuggester {
    pub fn new(
        tasks: &[Task],
        events: &[CalendarEvent],
        now: DateTime<FixedOffset>,
        workday: WorkdayWindow,
    ) -> Self {
        let mut busy: Vec<BusyBlock> = events
            .iter()
            .filter_map(|event| {
                event.interval().map(|interval| BusyBlock {
                    owner: format!("event:{}", event.id),
                    interval,
                })
            })
            .collect();

        busy.extend(qualifying_tasks(tasks).into_iter().map(|(task, interval)| BusyBlock {
            owner: format!("task:{}", task.id),
            interval,
        }));

        Self { busy, now, workday }
    }

    pub fn suggest_reschedule(&self, conflict: &Conflict) -> RescheduleSuggestion {
        let task = &conflict.task;
        let owner = format!("task:{}", task.id);
        let busy: Vec<TimeInterval> = self
            .busy
            .iter()
            .filter(|block| block.owner != owner)
            .map(|block| block.interval)
            .collect();

        let original = task.due_at.unwrap_or_else(|| conflict.overlap.start());
        let duration = task
            .scheduled_interval()
            .map(|interval| interval.duration_minutes())
            .unwrap_or_else(|| conflict.overlap.duration_minutes());

        let mut candidates: Vec<(DateTime<FixedOffset>, RescheduleKind, String)> = Vec::new();

        if let Some(counterpart_end) = conflict.counterpart.interval().map(|i| i.end()) {
            let from = counterpart_end.max(self.now).with_timezone(original.offset());
            if let Ok(midnight) = start_of_next_day(original) {
                if let Some(start) = first_free_slot(from, duration, midnight, &busy) {
                    candidates.push((
                        start,
                        RescheduleKind::AfterCounterpart,
                        format!("After \"{}\"", conflict.counterpart.title()),
                    ));
                }
            }
        }

        if let Ok(next_day) = add_days(original, 1) {
            if next_day >= self.now {
                candidates.push((
                    next_day,
                    RescheduleKind::NextDaySameTime,
                    "Same time tomorrow".to_string(),
                ));
            }
        }

        if task.is_overdue(self.now) {
            if let Ok(tomorrow) = start_of_next_day(self.now) {
                let from = self.workday.start_on(tomorrow);
                if let Ok(limit) = start_of_next_day(tomorrow) {
                    if let Some(start) = first_free_slot(from, duration, limit, &busy) {
                        candidates.push((
                            start,
                            RescheduleKind::PushToTomorrow,
                            "First free slot tomorrow".to_string(),
                        ));
                    }
                }
            }
        }

        let mut options: Vec<RescheduleOption> = Vec::with_capacity(candidates.len());
        for (start_at, kind, reason) in candidates {
            if start_at < self.now {
                continue;
            }
            let option = RescheduleOption {
                start_at,
                duration_minutes: duration,
                reason,
                score: self.score(start_at, duration, original, &busy),
                kind,
            };
            match options.iter_mut().find(|existing| existing.start_at == option.start_at) {
                Some(existing) if existing.score < option.score => *existing = option,
                Some(_) => {}
                None => options.push(option),
            }
        }

        options.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.start_at.cmp(&b.start_at))
        });

        debug!(
            target: "app::reschedule",
            task_id = %task.id,
            options = options.len(),
            "reschedule options generated"
        );

        RescheduleSuggestion {
            conflict: conflict.clone(),
            recommended_option: options.first().cloned(),
            options,
        }
    }

    /// Greedily picks one option per conflicting task so that no two accepted
    /// options overlap and none overlaps its own counterpart.
    pub fn suggest_batch_reschedule(&self, conflicts: &[Conflict]) -> BatchRescheduleSuggestion {
        let mut ordered: Vec<&Conflict> = conflicts.iter().collect();
        ordered.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| match (a.task.due_at, b.task.due_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.task.id.cmp(&b.task.id))
        });

        let mut suggestions = Vec::with_capacity(ordered.len());
        let mut accepted: Vec<AcceptedOption> = Vec::new();
        let mut accepted_index: HashMap<String, usize> = HashMap::new();
        let mut unresolved: Vec<String> = Vec::new();

        for conflict in ordered {
            let suggestion = self.suggest_reschedule(conflict);
            let task_id = conflict.task.id.clone();
            let counterpart = conflict.counterpart.interval();

            let resolved = match accepted_index.get(&task_id) {
                Some(index) => clears(&accepted[*index].option, counterpart.as_ref()),
                None => {
                    let pick = suggestion.options.iter().find(|option| {
                        let Ok(interval) = option.interval() else {
                            return false;
                        };
                        let hits_counterpart = counterpart
                            .as_ref()
                            .map(|other| interval.overlaps(other))
                            .unwrap_or(false);
                        let hits_accepted = accepted.iter().any(|entry| {
                            entry.task_id != task_id
                                && entry
                                    .option
                                    .interval()
                                    .map(|other| interval.overlaps(&other))
                                    .unwrap_or(false)
                        });
                        !hits_counterpart && !hits_accepted
                    });

                    match pick {
                        Some(option) => {
                            accepted_index.insert(task_id.clone(), accepted.len());
                            accepted.push(AcceptedOption {
                                task_id: task_id.clone(),
                                option: option.clone(),
                            });
                            true
                        }
                        None => false,
                    }
                }
            };

            if !resolved && !unresolved.contains(&task_id) {
                unresolved.push(task_id);
            }
            suggestions.push(suggestion);
        }

        let can_auto_resolve = unresolved.is_empty();
        info!(
            target: "app::reschedule",
            conflicts = conflicts.len(),
            accepted = accepted.len(),
            unresolved = unresolved.len(),
            can_auto_resolve,
            "batch reschedule planned"
        );

        BatchRescheduleSuggestion {
            suggestions,
            accepted,
            unresolved_task_ids: unresolved,
            can_auto_resolve,
        }
    }

    fn score(
        &self,
        start_at: DateTime<FixedOffset>,
        duration: i64,
        original: DateTime<FixedOffset>,
        busy: &[TimeInterval],
    ) -> f64 {
        let mut score = BASE_SCORE;

        if same_day(original, start_at) {
            score += SAME_DAY_BONUS;
        }

        let displaced_hours = (start_at - original).num_minutes().abs() as f64 / 60.0;
        score -= (displaced_hours * DISPLACEMENT_PENALTY_PER_HOUR).min(MAX_DISPLACEMENT_PENALTY);

        let collides = TimeInterval::from_minutes(start_at, duration)
            .map(|interval| busy.iter().any(|other| interval.overlaps(other)))
            .unwrap_or(false);
        if collides {
            score -= BUSY_OVERLAP_PENALTY;
        }

        score
    }
}

fn clears(option: &RescheduleOption, counterpart: Option<&TimeInterval>) -> bool {
    let Ok(interval) = option.interval() else {
        return false;
    };
    counterpart
        .map(|other| !interval.overlaps(other))
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskPriority;
    use crate::services::conflict_detector::ConflictDetector;
    use chrono::TimeZone;

    fn dt(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 4, day, hour, minute, 0)
            .unwrap()
    }

    fn task(id: &str, start: DateTime<FixedOffset>, minutes: i64, priority: TaskPriority) -> Task {
        Task::new(id, dt(1, 7, 0))
            .with_id(id)
            .with_due_at(Some(start))
            .with_estimated_minutes(Some(minutes))
            .with_priority(priority)
    }

    #[test]
    fn after_counterpart_option_is_recommended() {
        let now = dt(14, 8, 0);
        let tasks = vec![task("report", dt(14, 14, 0), 60, TaskPriority::Medium)];
        let events = vec![CalendarEvent::new("sync", "Sync", dt(14, 14, 30), dt(14, 15, 0))];
        let conflicts = ConflictDetector::new().scan_for_conflicts(&tasks, &events);

        let suggester = RescheduleSuggester::new(&tasks, &events, now, WorkdayWindow::default());
        let suggestion = suggester.suggest_reschedule(&conflicts[0]);

        let best = suggestion.recommended_option.expect("recommended option");
        assert_eq!(best.kind, RescheduleKind::AfterCounterpart);
        assert_eq!(best.start_at, dt(14, 15, 0));
        assert_eq!(best.duration_minutes, 60);
        assert_eq!(suggestion.options.len(), 2);
        assert_eq!(suggestion.options[1].kind, RescheduleKind::NextDaySameTime);
    }

    #[test]
    fn options_never_start_before_now() {
        let now = dt(14, 16, 0);
        let tasks = vec![task("late", dt(13, 9, 0), 90, TaskPriority::Low)];
        let events = vec![CalendarEvent::new("e", "Review", dt(13, 9, 30), dt(13, 10, 0))];
        let conflicts = ConflictDetector::new().scan_for_conflicts(&tasks, &events);

        let suggester = RescheduleSuggester::new(&tasks, &events, now, WorkdayWindow::default());
        let suggestion = suggester.suggest_reschedule(&conflicts[0]);

        assert!(!suggestion.options.is_empty());
        assert!(suggestion.options.iter().all(|option| option.start_at >= now));
        assert!(suggestion
            .options
            .iter()
            .any(|option| option.kind == RescheduleKind::PushToTomorrow
                && option.start_at == dt(15, 9, 0)));
    }

    #[test]
    fn slot_after_counterpart_skips_other_busy_blocks() {
        let now = dt(14, 8, 0);
        let tasks = vec![
            task("mover", dt(14, 10, 0), 60, TaskPriority::Low),
            task("fixed", dt(14, 11, 0), 30, TaskPriority::High),
        ];
        let events = vec![CalendarEvent::new("e", "Planning", dt(14, 10, 15), dt(14, 11, 0))];
        let conflicts = ConflictDetector::new().scan_for_conflicts(&tasks, &events);
        let conflict = conflicts
            .iter()
            .find(|conflict| conflict.counterpart.id() == "e")
            .expect("event conflict");

        let suggester = RescheduleSuggester::new(&tasks, &events, now, WorkdayWindow::default());
        let suggestion = suggester.suggest_reschedule(conflict);
        let after = suggestion
            .options
            .iter()
            .find(|option| option.kind == RescheduleKind::AfterCounterpart)
            .expect("after-counterpart option");

        assert_eq!(after.start_at, dt(14, 11, 30));
    }

    #[test]
    fn batch_accepts_non_overlapping_options() {
        let now = dt(14, 8, 0);
        let tasks = vec![
            task("a", dt(14, 9, 0), 60, TaskPriority::Medium),
            task("b", dt(14, 9, 0), 60, TaskPriority::Low),
            task("c", dt(14, 13, 0), 45, TaskPriority::High),
        ];
        let events = vec![
            CalendarEvent::new("m1", "Standup", dt(14, 9, 0), dt(14, 9, 30)),
            CalendarEvent::new("m2", "Lunch", dt(14, 13, 0), dt(14, 14, 0)),
        ];
        let detector = ConflictDetector::new();
        let conflicts = detector.scan_for_conflicts(&tasks, &events);

        let suggester = RescheduleSuggester::new(&tasks, &events, now, WorkdayWindow::default());
        let batch = suggester.suggest_batch_reschedule(&conflicts);

        assert!(batch.can_auto_resolve);
        assert!(batch.unresolved_task_ids.is_empty());
        for (index, first) in batch.accepted.iter().enumerate() {
            for second in batch.accepted.iter().skip(index + 1) {
                let a = first.option.interval().unwrap();
                let b = second.option.interval().unwrap();
                assert!(!a.overlaps(&b), "{} and {} overlap", first.task_id, second.task_id);
            }
        }

        let moved_ids: Vec<&str> = batch.accepted.iter().map(|entry| entry.task_id.as_str()).collect();
        let rescheduled: Vec<Task> = batch
            .apply_to(&tasks)
            .into_iter()
            .filter(|task| moved_ids.contains(&task.id.as_str()))
            .collect();
        assert!(detector.scan_for_conflicts(&rescheduled, &[]).is_empty());
    }

    #[test]
    fn batch_reports_tasks_without_a_clear_option() {
        let now = dt(14, 8, 0);
        let tasks = vec![task("wide", dt(14, 22, 0), 120, TaskPriority::Low)];
        let events = vec![
            CalendarEvent::new("night", "Night shift", dt(14, 21, 0), dt(15, 23, 59)),
        ];
        let conflicts = ConflictDetector::new().scan_for_conflicts(&tasks, &events);

        let suggester = RescheduleSuggester::new(&tasks, &events, now, WorkdayWindow::default());
        let batch = suggester.suggest_batch_reschedule(&conflicts);

        assert!(!batch.can_auto_resolve);
        assert_eq!(batch.unresolved_task_ids, vec!["wide".to_string()]);
    }
}
