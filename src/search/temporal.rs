//! Capture times known only up to an interval, and the distance between two of them.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Inclusive `[min, max]` window a capture time is known to lie in.
/// Exact timestamps have `min == max`; date-only timestamps span the whole day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
}

/// Smallest and largest number of seconds that can separate two [`TimeRange`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TemporalDistance {
    pub min_secs: i64,
    pub max_secs: i64,
}

impl TimeRange {
    pub fn exact(at: NaiveDateTime) -> Self {
        Self { min: at, max: at }
    }

    /// `00:00:00..=23:59:59` of `date`.
    pub fn whole_day(date: NaiveDate) -> Self {
        let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Self {
            min: date.and_time(NaiveTime::MIN),
            max: date.and_time(end),
        }
    }

    /// Normalizes reversed bounds.
    pub fn new(a: NaiveDateTime, b: NaiveDateTime) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn is_exact(&self) -> bool {
        self.min == self.max
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Worst case is the far ends of the two windows; best case is zero when they overlap,
    /// otherwise the gap between the nearer ends.
    pub fn distance(&self, other: &TimeRange) -> TemporalDistance {
        let max_secs = (self.max - other.min)
            .num_seconds()
            .abs()
            .max((other.max - self.min).num_seconds().abs());
        let min_secs = if self.overlaps(other) {
            0
        } else if self.max < other.min {
            (other.min - self.max).num_seconds()
        } else {
            (self.min - other.max).num_seconds()
        };
        TemporalDistance { min_secs, max_secs }
    }
}
