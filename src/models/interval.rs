use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Half-open time range `[start, end)`. Construction guarantees `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl TimeInterval {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> AppResult<Self> {
        if end <= start {
            return Err(AppError::validation("interval end must be after its start"));
        }
        Ok(Self { start, end })
    }

    pub fn from_minutes(start: DateTime<FixedOffset>, minutes: i64) -> AppResult<Self> {
        let end = start
            .checked_add_signed(Duration::minutes(minutes))
            .ok_or_else(|| AppError::validation("interval exceeds representable time"))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersection(&self, other: &TimeInterval) -> Option<TimeInterval> {
        if !self.overlaps(other) {
            return None;
        }
        Some(TimeInterval {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    pub fn contains(&self, instant: DateTime<FixedOffset>) -> bool {
        self.start <= instant && instant < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 5, 1, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn rejects_empty_or_inverted_ranges() {
        assert!(TimeInterval::new(at(10, 0), at(10, 0)).is_err());
        assert!(TimeInterval::new(at(11, 0), at(10, 0)).is_err());
    }

    #[test]
    fn touching_intervals_do_not_overlap() -> AppResult<()> {
        let morning = TimeInterval::new(at(9, 0), at(10, 0))?;
        let next = TimeInterval::new(at(10, 0), at(11, 0))?;
        assert!(!morning.overlaps(&next));
        assert!(!next.overlaps(&morning));
        assert!(morning.intersection(&next).is_none());
        Ok(())
    }

    #[test]
    fn intersection_is_the_shared_range() -> AppResult<()> {
        let task = TimeInterval::from_minutes(at(14, 0), 60)?;
        let event = TimeInterval::new(at(14, 30), at(15, 30))?;
        let shared = task.intersection(&event).expect("overlap");
        assert_eq!(shared.start(), at(14, 30));
        assert_eq!(shared.end(), at(15, 0));
        assert_eq!(shared.duration_minutes(), 30);
        Ok(())
    }
}
