//! Capture-time recovery from file and directory names.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;

use crate::search::TimeRange;

struct DatePatterns {
    /// `YYYYMMDD[_-]?HHMMSS` anywhere in the name: exact.
    stamp: Regex,
    /// `_YYYYMMDD_` / `-YYYYMMDD-` delimited date: whole day.
    delimited: Regex,
    /// Leading `YYYYMMDD`: whole day.
    leading: Regex,
    /// Leading `YYYY-MM-DD`: whole day.
    dashed: Regex,
}

static PATTERNS: OnceLock<Option<DatePatterns>> = OnceLock::new();

fn patterns() -> Option<&'static DatePatterns> {
    PATTERNS
        .get_or_init(|| {
            Some(DatePatterns {
                stamp: Regex::new(r"(\d{4})(\d{2})(\d{2})[_\-]?([0-2]\d)([0-5]\d)([0-5]\d)").ok()?,
                delimited: Regex::new(r"[\-_]([1-2]\d{3})([0-1]\d)([0-3]\d)[\-_]").ok()?,
                leading: Regex::new(r"^([1-2]\d{3})([0-1]\d)([0-3]\d)").ok()?,
                dashed: Regex::new(r"^([1-2]\d{3})-([0-1]\d)-([0-3]\d)").ok()?,
            })
        })
        .as_ref()
}

fn num(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i)?.as_str().parse().ok()
}

fn date_from(caps: &Captures<'_>) -> Option<NaiveDate> {
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, num(caps, 2)?, num(caps, 3)?)
}

fn stamp_from(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let time = NaiveTime::from_hms_opt(num(caps, 4)?, num(caps, 5)?, num(caps, 6)?)?;
    Some(date_from(caps)?.and_time(time))
}

fn day_in(re: &Regex, name: &str) -> Option<TimeRange> {
    re.captures(name)
        .and_then(|c| date_from(&c))
        .map(TimeRange::whole_day)
}

/// Capture time from a file name: an embedded timestamp is exact, a date alone covers the day.
pub fn range_from_filename(name: &str) -> Option<TimeRange> {
    let p = patterns()?;
    if let Some(at) = p.stamp.captures(name).and_then(|c| stamp_from(&c)) {
        return Some(TimeRange::exact(at));
    }
    day_in(&p.delimited, name)
        .or_else(|| day_in(&p.leading, name))
        .or_else(|| day_in(&p.dashed, name))
}

/// Date from the nearest ancestor directory named like `20220103...` or `2022-01-03...`.
/// With a `root`, directories above it are not considered.
pub fn range_from_directories(path: &Path, root: Option<&Path>) -> Option<TimeRange> {
    let p = patterns()?;
    path.parent()?
        .ancestors()
        .take_while(|dir| root.is_none_or(|r| dir.starts_with(r)))
        .filter_map(|dir| dir.file_name()?.to_str())
        .find_map(|part| day_in(&p.leading, part).or_else(|| day_in(&p.dashed, part)))
}
