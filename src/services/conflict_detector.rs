use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::calendar::CalendarEvent;
use crate::models::conflict::{Conflict, ConflictCounterpart, ConflictSeverity};
use crate::models::interval::TimeInterval;
use crate::models::task::{Task, TaskPriority};
use crate::services::providers::CalendarAccessProvider;
use crate::services::schedule_utils::{start_of_day, start_of_next_day};

/// Result of a scan that consulted the calendar provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictScan {
    pub conflicts: Vec<Conflict>,
    /// Events the scan saw; empty when the calendar was unavailable.
    pub events: Vec<CalendarEvent>,
    pub calendar_available: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn scan_for_conflicts(&self, tasks: &[Task], events: &[CalendarEvent]) -> Vec<Conflict> {
        let scheduled = qualifying_tasks(tasks);

        let mut valid_events: Vec<(&CalendarEvent, TimeInterval)> = Vec::with_capacity(events.len());
        for event in events {
            match event.interval() {
                Some(interval) => valid_events.push((event, interval)),
                None => warn!(
                    target: "app::conflicts",
                    event_id = %event.id,
                    "skipping calendar event whose end does not follow its start"
                ),
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut conflicts = Vec::new();

        for (task, interval) in &scheduled {
            for (event, event_interval) in &valid_events {
                let Some(overlap) = interval.intersection(event_interval) else {
                    continue;
                };
                let severity = classify(&overlap, interval, event_interval, task.priority);
                let conflict = Conflict {
                    task: (*task).clone(),
                    counterpart: ConflictCounterpart::Event((*event).clone()),
                    overlap,
                    severity,
                };
                if seen.insert(conflict.id()) {
                    conflicts.push(conflict);
                }
            }
        }

        for (index, (first, first_interval)) in scheduled.iter().enumerate() {
            for (second, second_interval) in scheduled.iter().skip(index + 1) {
                if first.id == second.id {
                    continue;
                }
                let Some(overlap) = first_interval.intersection(second_interval) else {
                    continue;
                };
                let (movable, anchored) = split_movable(first, second);
                let severity = classify(&overlap, first_interval, second_interval, movable.priority);
                let conflict = Conflict {
                    task: movable.clone(),
                    counterpart: ConflictCounterpart::Task(anchored.clone()),
                    overlap,
                    severity,
                };
                let mirrored = format!("{}|task:{}", anchored.id, movable.id);
                if !seen.contains(&mirrored) && seen.insert(conflict.id()) {
                    conflicts.push(conflict);
                }
            }
        }

        sort_conflicts(&mut conflicts);

        debug!(
            target: "app::conflicts",
            tasks = scheduled.len(),
            events = valid_events.len(),
            conflicts = conflicts.len(),
            "conflict scan finished"
        );

        conflicts
    }

    /// Fetches the events covering today and every scheduled task, then
    /// scans them. A failing provider narrows the scan to task-vs-task
    /// overlaps.
    pub async fn scan_with_calendar(
        &self,
        tasks: &[Task],
        provider: &dyn CalendarAccessProvider,
        now: DateTime<FixedOffset>,
    ) -> AppResult<ConflictScan> {
        let (range_start, range_end) = scan_range(tasks, now)?;

        let (events, calendar_available) = match provider.events_in_range(range_start, range_end).await {
            Ok(events) => (events, true),
            Err(err) => {
                warn!(
                    target: "app::conflicts",
                    error = %err,
                    "calendar unavailable, scanning task overlaps only"
                );
                (Vec::new(), false)
            }
        };

        let conflicts = self.scan_for_conflicts(tasks, &events);
        info!(
            target: "app::conflicts",
            conflicts = conflicts.len(),
            calendar_available,
            "scheduled tasks scanned"
        );

        Ok(ConflictScan {
            conflicts,
            events,
            calendar_available,
        })
    }
}

/// Incomplete tasks that occupy a concrete interval.
pub(crate) fn qualifying_tasks(tasks: &[Task]) -> Vec<(&Task, TimeInterval)> {
    tasks
        .iter()
        .filter_map(|task| {
            if task.is_completed {
                debug!(target: "app::conflicts", task_id = %task.id, "completed task skipped");
                return None;
            }
            match task.scheduled_interval() {
                Some(interval) => Some((task, interval)),
                None => {
                    debug!(target: "app::conflicts", task_id = %task.id, "unscheduled task skipped");
                    None
                }
            }
        })
        .collect()
}

fn classify(
    overlap: &TimeInterval,
    first: &TimeInterval,
    second: &TimeInterval,
    priority: TaskPriority,
) -> ConflictSeverity {
    let overlap_seconds = (overlap.end() - overlap.start()).num_seconds();
    let shorter_seconds = (first.end() - first.start())
        .num_seconds()
        .min((second.end() - second.start()).num_seconds());

    if overlap_seconds * 2 >= shorter_seconds || priority == TaskPriority::High {
        ConflictSeverity::High
    } else if priority == TaskPriority::Medium {
        ConflictSeverity::Medium
    } else {
        ConflictSeverity::Low
    }
}

/// Orders a task pair as (movable, anchored).
fn split_movable<'a>(a: &'a Task, b: &'a Task) -> (&'a Task, &'a Task) {
    let a_is_movable = a
        .priority
        .cmp(&b.priority)
        .reverse()
        .then_with(|| a.due_at.cmp(&b.due_at))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
        == Ordering::Greater;

    if a_is_movable {
        (a, b)
    } else {
        (b, a)
    }
}

fn sort_conflicts(conflicts: &mut [Conflict]) {
    conflicts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.overlap.start().cmp(&b.overlap.start()))
            .then_with(|| a.task.id.cmp(&b.task.id))
            .then_with(|| a.counterpart.key().cmp(&b.counterpart.key()))
    });
}

fn scan_range(
    tasks: &[Task],
    now: DateTime<FixedOffset>,
) -> AppResult<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let scheduled = qualifying_tasks(tasks);
    let earliest = scheduled
        .iter()
        .map(|(_, interval)| interval.start())
        .min()
        .map_or(now, |start| start.min(now));
    let latest = scheduled
        .iter()
        .map(|(_, interval)| interval.end())
        .max()
        .map_or(now, |end| end.max(now));

    let start = start_of_day(earliest.with_timezone(now.offset()));
    let end = start_of_next_day(latest.with_timezone(now.offset()))?;
    Ok((start, end))
}
