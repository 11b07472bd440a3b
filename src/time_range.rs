//! Time-range parsing and overlap.
//!
//! Two grammars are accepted for `preferred_time`:
//! - 12-hour: `"9:00 AM - 10:30 AM"` (meridiem case-insensitive)
//! - 24-hour: `"09:00-10:30"`
//!
//! Both parse into a half-open minute interval `[start, end)` within one day.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Minutes in a day; every range lies in `[0, MINUTES_PER_DAY)`.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

static TWELVE_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,2}):(\d{2})\s*([ap]m)\s*-\s*(\d{1,2}):(\d{2})\s*([ap]m)\s*$").unwrap()
});

static TWENTY_FOUR_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2}):(\d{2})\s*-\s*(\d{1,2}):(\d{2})\s*$").unwrap()
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("Unrecognized time range format: {0:?}")]
    UnrecognizedFormat(String),

    #[error("Clock value out of range in {0:?}")]
    OutOfRange(String),

    #[error("Time range must end after it starts: {0:?}")]
    EmptyRange(String),
}

/// Half-open minute interval within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    pub fn new(start: u16, end: u16) -> Option<Self> {
        (start < end && end < MINUTES_PER_DAY).then_some(Self { start, end })
    }

    /// Parse either accepted grammar.
    pub fn parse(text: &str) -> Result<Self, TimeRangeError> {
        let (start, end) = if let Some(caps) = TWELVE_HOUR.captures(text) {
            let start = twelve_hour_minutes(&caps[1], &caps[2], &caps[3])
                .ok_or_else(|| TimeRangeError::OutOfRange(text.into()))?;
            let end = twelve_hour_minutes(&caps[4], &caps[5], &caps[6])
                .ok_or_else(|| TimeRangeError::OutOfRange(text.into()))?;
            (start, end)
        } else if let Some(caps) = TWENTY_FOUR_HOUR.captures(text) {
            let start = clock_minutes(&caps[1], &caps[2], 0..=23)
                .ok_or_else(|| TimeRangeError::OutOfRange(text.into()))?;
            let end = clock_minutes(&caps[3], &caps[4], 0..=23)
                .ok_or_else(|| TimeRangeError::OutOfRange(text.into()))?;
            (start, end)
        } else {
            return Err(TimeRangeError::UnrecognizedFormat(text.into()));
        };

        Self::new(start, end).ok_or_else(|| TimeRangeError::EmptyRange(text.into()))
    }

    /// `[a.start, a.end)` and `[b.start, b.end)` share at least one minute.
    /// Touching ranges (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end - self.start
    }
}

impl FromStr for TimeRange {
    type Err = TimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

/// Conflict test on raw `preferred_time` strings.
///
/// When either side fails to parse, falls back to exact string equality.
/// This can miss conflicts between equivalent ranges written in different
/// formats; it is kept for compatibility with existing stored rows.
pub fn ranges_conflict(a: &str, b: &str) -> bool {
    match (TimeRange::parse(a), TimeRange::parse(b)) {
        (Ok(ra), Ok(rb)) => ra.overlaps(&rb),
        _ => {
            tracing::debug!(a, b, "time range unparseable, comparing as strings");
            a == b
        }
    }
}

fn clock_minutes(hour: &str, minute: &str, hours: std::ops::RangeInclusive<u16>) -> Option<u16> {
    let hour: u16 = hour.parse().ok()?;
    let minute: u16 = minute.parse().ok()?;
    (hours.contains(&hour) && minute < 60).then_some(hour * 60 + minute)
}

fn twelve_hour_minutes(hour: &str, minute: &str, meridiem: &str) -> Option<u16> {
    let total = clock_minutes(hour, minute, 1..=12)?;
    let (hour, minute) = (total / 60, total % 60);
    let hour = match (hour, meridiem.eq_ignore_ascii_case("pm")) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    Some(hour * 60 + minute)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(text: &str) -> TimeRange {
        TimeRange::parse(text).unwrap()
    }

    #[test]
    fn both_grammars_yield_same_minutes() {
        assert_eq!(r("09:00-10:00"), TimeRange { start: 540, end: 600 });
        assert_eq!(r("9:00 AM - 10:00 AM"), TimeRange { start: 540, end: 600 });
    }

    #[test]
    fn meridiem_is_case_insensitive() {
        assert_eq!(r("1:30 pm - 2:45 Pm"), TimeRange { start: 810, end: 885 });
    }

    #[test]
    fn twelve_am_and_pm_edge_hours() {
        assert_eq!(r("12:00 AM - 1:00 AM"), TimeRange { start: 0, end: 60 });
        assert_eq!(r("11:00 AM - 12:30 PM"), TimeRange { start: 660, end: 750 });
        assert_eq!(r("12:15 PM - 1:00 PM"), TimeRange { start: 735, end: 780 });
    }

    #[test]
    fn whitespace_is_tolerated() {
        assert_eq!(r("  9:00AM-10:00AM "), TimeRange { start: 540, end: 600 });
        assert_eq!(r("09:00 - 10:00"), TimeRange { start: 540, end: 600 });
    }

    #[test]
    fn unrecognized_text_is_parse_error() {
        assert!(matches!(
            TimeRange::parse("morning"),
            Err(TimeRangeError::UnrecognizedFormat(_))
        ));
        assert!(TimeRange::parse("9:00 AM").is_err());
        assert!(TimeRange::parse("").is_err());
    }

    #[test]
    fn out_of_range_clock_values_rejected() {
        assert!(matches!(
            TimeRange::parse("13:00 PM - 2:00 PM"),
            Err(TimeRangeError::OutOfRange(_))
        ));
        assert!(TimeRange::parse("0:00 AM - 1:00 AM").is_err());
        assert!(TimeRange::parse("24:00-25:00").is_err());
        assert!(TimeRange::parse("09:60-10:00").is_err());
    }

    #[test]
    fn reversed_or_empty_range_rejected() {
        assert!(matches!(
            TimeRange::parse("10:00-09:00"),
            Err(TimeRangeError::EmptyRange(_))
        ));
        assert!(TimeRange::parse("10:00-10:00").is_err());
        // Wraps past midnight
        assert!(TimeRange::parse("11:00 PM - 12:00 AM").is_err());
    }

    #[test]
    fn overlap_scenario_from_booking() {
        let a = r("9:00 AM - 10:00 AM");
        let b = r("9:30 AM - 10:30 AM");
        assert_eq!((a.start, a.end, b.start, b.end), (540, 600, 570, 630));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        let a = r("09:00-10:00");
        let b = r("10:00-11:00");
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn containment_overlaps() {
        assert!(r("08:00-12:00").overlaps(&r("09:00-09:15")));
    }

    #[test]
    fn overlap_is_symmetric_over_grid() {
        let starts = [0u16, 30, 59, 60, 90, 600, 1380];
        let mut ranges = Vec::new();
        for &s in &starts {
            for len in [1u16, 15, 60, 45] {
                if let Some(range) = TimeRange::new(s, s + len) {
                    ranges.push(range);
                }
            }
        }
        for a in &ranges {
            for b in &ranges {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{a} vs {b}");
                if a.end <= b.start {
                    assert!(!a.overlaps(b), "{a} ends before {b}");
                }
            }
        }
    }

    #[test]
    fn fallback_compares_strings_when_unparseable() {
        assert!(ranges_conflict("after lunch", "after lunch"));
        assert!(!ranges_conflict("after lunch", "morning"));
        // Equivalent wall-clock time but one side unparseable: no conflict detected
        assert!(!ranges_conflict("9-10am", "9:00 AM - 10:00 AM"));
    }

    #[test]
    fn mixed_grammars_compare_numerically() {
        assert!(ranges_conflict("09:30-10:30", "9:00 AM - 10:00 AM"));
        assert!(!ranges_conflict("10:00-11:00", "9:00 AM - 10:00 AM"));
    }

    #[test]
    fn display_uses_24_hour_form() {
        assert_eq!(r("1:05 PM - 2:00 PM").to_string(), "13:05-14:00");
        assert_eq!("13:05-14:00".parse::<TimeRange>().unwrap(), r("1:05 PM - 2:00 PM"));
    }
}
