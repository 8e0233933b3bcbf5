use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone};

use crate::error::{AppError, AppResult};
use crate::models::interval::TimeInterval;

pub fn add_minutes(dt: DateTime<FixedOffset>, minutes: i64) -> AppResult<DateTime<FixedOffset>> {
    dt.checked_add_signed(Duration::minutes(minutes))
        .ok_or_else(|| AppError::validation("time arithmetic out of range"))
}

pub fn add_days(dt: DateTime<FixedOffset>, days: i64) -> AppResult<DateTime<FixedOffset>> {
    dt.checked_add_signed(Duration::days(days))
        .ok_or_else(|| AppError::validation("time arithmetic out of range"))
}

/// Calendar-day equality, evaluated in `a`'s offset.
pub fn same_day(a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> bool {
    a.date_naive() == b.with_timezone(a.offset()).date_naive()
}

pub fn start_of_day(dt: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let midnight = dt.date_naive().and_time(NaiveTime::MIN);
    dt.offset()
        .from_local_datetime(&midnight)
        .single()
        .unwrap_or(dt)
}

pub fn start_of_next_day(dt: DateTime<FixedOffset>) -> AppResult<DateTime<FixedOffset>> {
    add_days(start_of_day(dt), 1)
}

/// `dt`'s calendar day at `time`, in `dt`'s offset.
pub fn at_time(dt: DateTime<FixedOffset>, time: NaiveTime) -> DateTime<FixedOffset> {
    let local = dt.date_naive().and_time(time);
    dt.offset()
        .from_local_datetime(&local)
        .single()
        .unwrap_or(dt)
}

/// Sorted, non-overlapping cover of `intervals`. Touching ranges are joined.
pub fn merge_intervals(mut intervals: Vec<TimeInterval>) -> Vec<TimeInterval> {
    intervals.sort_by(|a, b| a.start().cmp(&b.start()).then_with(|| a.end().cmp(&b.end())));

    let mut merged: Vec<TimeInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start() <= last.end() => {
                if interval.end() > last.end() {
                    if let Ok(joined) = TimeInterval::new(last.start(), interval.end()) {
                        *last = joined;
                    }
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Minutes of `window` covered by any of `busy`.
pub fn busy_minutes_within(window: &TimeInterval, busy: &[TimeInterval]) -> i64 {
    let clipped: Vec<TimeInterval> = busy
        .iter()
        .filter_map(|interval| interval.intersection(window))
        .collect();
    merge_intervals(clipped)
        .iter()
        .map(TimeInterval::duration_minutes)
        .sum()
}

/// Earliest start `>= from` such that `[start, start + duration)` ends by
/// `limit` and overlaps none of `busy`.
pub fn first_free_slot(
    from: DateTime<FixedOffset>,
    duration_minutes: i64,
    limit: DateTime<FixedOffset>,
    busy: &[TimeInterval],
) -> Option<DateTime<FixedOffset>> {
    if duration_minutes <= 0 {
        return None;
    }

    let duration = Duration::minutes(duration_minutes);
    let offset = *from.offset();
    let mut candidate = from;

    for interval in merge_intervals(busy.to_vec()) {
        if interval.end() <= candidate {
            continue;
        }
        if interval.start() >= candidate.checked_add_signed(duration)? {
            break;
        }
        candidate = interval.end().with_timezone(&offset);
    }

    let end = candidate.checked_add_signed(duration)?;
    (end <= limit).then_some(candidate)
}
