use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use tracing::debug;

use crate::models::recurrence::{Frequency, RecurringRule};
use crate::models::task::Task;

pub const MAX_OCCURRENCES: usize = 500;

/// Configuration for occurrence expansion
#[derive(Debug, Clone, Copy)]
pub struct ExpansionConfig {
    /// Upper bound on timestamps returned by a single call
    pub max_occurrences: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_occurrences: MAX_OCCURRENCES,
        }
    }
}

/// Expands validated recurrence rules into concrete timestamps
#[derive(Debug, Clone, Default)]
pub struct RecurrenceExpander {
    config: ExpansionConfig,
}

impl RecurrenceExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExpansionConfig) -> Self {
        Self { config }
    }

    /// Occurrences `t` with `after < t <= until`, never before the anchor nor
    /// past the rule's end date, in ascending order.
    pub fn next_occurrences(
        &self,
        rule: &RecurringRule,
        after: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> Vec<DateTime<FixedOffset>> {
        expand(rule, after, Some(until), self.config.max_occurrences)
    }

    /// First occurrence strictly after `after`, if the rule has one.
    pub fn next_occurrence(
        &self,
        rule: &RecurringRule,
        after: DateTime<FixedOffset>,
    ) -> Option<DateTime<FixedOffset>> {
        expand(rule, after, None, 1).into_iter().next()
    }

    /// Follow-up instance for a completed recurring task, due at the first
    /// occurrence after both its due time and its completion.
    pub fn materialize_next(&self, task: &Task, completed_at: DateTime<FixedOffset>) -> Option<Task> {
        let rule = task.recurrence.as_ref()?;
        let after = task
            .due_at
            .map(|due| due.max(completed_at))
            .unwrap_or(completed_at);
        let due = self.next_occurrence(rule, after)?;

        let next = Task::new(task.title.clone(), completed_at)
            .with_due_at(Some(due))
            .with_estimated_minutes(task.estimated_minutes)
            .with_priority(task.priority)
            .with_category(task.category.clone())
            .with_recurrence(Some(rule.clone()))
            .with_parent(task.parent_id.clone());

        debug!(
            target: "app::recurrence",
            task_id = %task.id,
            next_id = %next.id,
            due = %due,
            "recurring task materialized"
        );
        Some(next)
    }
}

fn expand(
    rule: &RecurringRule,
    after: DateTime<FixedOffset>,
    until: Option<DateTime<FixedOffset>>,
    limit: usize,
) -> Vec<DateTime<FixedOffset>> {
    let offset = *rule.anchor().offset();
    let anchor = rule.anchor();

    let upper = match (until, rule.end_date()) {
        (Some(until), Some(end)) => Some(until.min(end)),
        (Some(bound), None) | (None, Some(bound)) => Some(bound),
        (None, None) => None,
    };
    if let Some(upper) = upper {
        if upper <= after || upper < anchor {
            return Vec::new();
        }
    }

    let lower = after.max(anchor);
    let first_day = lower.with_timezone(&offset).date_naive();
    let last_day = upper.map(|bound| bound.with_timezone(&offset).date_naive());

    let accepts = |candidate: DateTime<FixedOffset>| {
        candidate >= anchor && candidate > after && upper.map(|bound| candidate <= bound).unwrap_or(true)
    };

    let mut occurrences = Vec::new();
    let mut day = match rule.frequency() {
        Frequency::Daily | Frequency::Custom => first_stepped_day(rule, first_day),
        _ => Some(first_day),
    };

    while let Some(current) = day {
        if last_day.map(|last| current > last).unwrap_or(false) {
            break;
        }

        for time in times_on(rule, current) {
            let Some(candidate) = offset.from_local_datetime(&current.and_time(time)).single() else {
                continue;
            };
            if accepts(candidate) {
                occurrences.push(candidate);
                if occurrences.len() >= limit {
                    return occurrences;
                }
            }
        }

        day = match rule.frequency() {
            Frequency::Daily | Frequency::Custom => {
                current.checked_add_signed(Duration::days(step_days(rule)))
            }
            _ => current.succ_opt(),
        };
    }

    occurrences
}

fn step_days(rule: &RecurringRule) -> i64 {
    match rule.frequency() {
        Frequency::Custom => i64::from(rule.interval().max(1)),
        _ => 1,
    }
}

/// First day on the rule's day grid that is not before `from`.
fn first_stepped_day(rule: &RecurringRule, from: NaiveDate) -> Option<NaiveDate> {
    let anchor_day = rule.anchor().date_naive();
    if from <= anchor_day {
        return Some(anchor_day);
    }
    let step = step_days(rule);
    let elapsed = (from - anchor_day).num_days();
    let steps = (elapsed + step - 1) / step;
    anchor_day.checked_add_signed(Duration::days(steps * step))
}

/// Local times the rule fires at on `day`, ascending.
fn times_on(rule: &RecurringRule, day: NaiveDate) -> Vec<NaiveTime> {
    let anchor_time = rule.anchor().time();
    let weekday_allowed = |day: NaiveDate| {
        rule.days_of_week().is_empty() || rule.days_of_week().contains(&day.weekday())
    };

    match rule.frequency() {
        Frequency::Daily | Frequency::Custom => vec![anchor_time],
        Frequency::Weekly => {
            if rule.days_of_week().contains(&day.weekday()) {
                vec![anchor_time]
            } else {
                Vec::new()
            }
        }
        Frequency::Hourly => {
            if !weekday_allowed(day) {
                return Vec::new();
            }
            // Both window edges are excluded: the first slot is one step in.
            let active = rule.active_hours();
            let step = Duration::hours(i64::from(rule.interval().max(1)));
            let mut times = Vec::new();
            let mut current = active.start;
            loop {
                let (next, wrapped) = current.overflowing_add_signed(step);
                if wrapped != 0 || next <= current || next >= active.end {
                    break;
                }
                times.push(next);
                current = next;
            }
            times
        }
        Frequency::TimesPerDay => {
            if !weekday_allowed(day) {
                return Vec::new();
            }
            if let Some(specific) = rule.specific_times() {
                return specific.to_vec();
            }
            let active = rule.active_hours();
            let window_seconds = (active.end - active.start).num_seconds();
            let count = i64::from(rule.times_per_day());
            (0..count)
                .map(|index| active.start + Duration::seconds(window_seconds * index / count))
                .collect()
        }
    }
}
