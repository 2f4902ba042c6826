//! Decimal-hour time arithmetic.
//!
//! Hours of day are `f64` in `0.0..24.0`, so that `2.5` is `02:30`. Minute rounding happens only
//! when a value is normalised or displayed.

use std::{
    fmt::{Debug, Display, Formatter},
    ops::Range,
    str::FromStr,
};

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{prelude::*, quantity::time::Hours};

/// Wrap the hour into `0.0..24.0` and round it to the nearest minute.
#[must_use]
pub fn normalize_hour(hour: f64) -> f64 {
    let rounded = (hour.rem_euclid(24.0) * 60.0).round() / 60.0;
    if rounded >= 24.0 { rounded - 24.0 } else { rounded }
}

/// Split the decimal hour into the clock hour and minute.
#[must_use]
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn split_hour_minute(hour: f64) -> (u32, u32) {
    let minutes = (normalize_hour(hour) * 60.0).round() as u32;
    (minutes / 60, minutes % 60)
}

/// Check whether the hour of day falls into the half-open period.
///
/// Periods with `start > end` span midnight. Zero-length periods contain nothing.
#[must_use]
pub fn hour_in_period(hour: f64, start: f64, end: f64) -> bool {
    let (hour, start, end) = (normalize_hour(hour), normalize_hour(start), normalize_hour(end));
    if start == end {
        false
    } else if start < end {
        (start <= hour) && (hour < end)
    } else {
        (start <= hour) || (hour < end)
    }
}

/// Length of the intersection of two ranges on the linear hour axis.
#[must_use]
pub fn overlap(lhs: Range<f64>, rhs: Range<f64>) -> f64 {
    (lhs.end.min(rhs.end) - lhs.start.max(rhs.start)).max(0.0)
}

/// Fractional hour of the day of the timestamp.
#[must_use]
pub fn decimal_hour(timestamp: NaiveDateTime) -> f64 {
    f64::from(timestamp.hour())
        + f64::from(timestamp.minute()) / 60.0
        + f64::from(timestamp.second()) / 3600.0
}

#[must_use]
pub fn start_of_hour(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.date().and_hms_opt(timestamp.hour(), 0, 0).unwrap_or(timestamp)
}

/// Clock time of day, deserialised from `HH:MM` (or a bare decimal hour).
#[derive(Copy, Clone, PartialEq, PartialOrd, SerializeDisplay, DeserializeFromStr)]
pub struct ClockTime(pub f64);

impl ClockTime {
    #[cfg(test)]
    #[must_use]
    pub fn from_hm(hour: u32, minute: u32) -> Self {
        Self(f64::from(hour) + f64::from(minute) / 60.0)
    }

    /// Time of day of the timestamp, rounded to the minute.
    #[must_use]
    pub fn of(timestamp: NaiveDateTime) -> Self {
        Self(normalize_hour(decimal_hour(timestamp)))
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hour = match s.split_once(':') {
            Some((hour, minute)) => {
                let hour: u32 = hour.trim().parse().with_context(|| format!("bad hour in `{s}`"))?;
                let minute: u32 =
                    minute.trim().parse().with_context(|| format!("bad minute in `{s}`"))?;
                ensure!(minute < 60, "minute is out of range in `{s}`");
                f64::from(hour) + f64::from(minute) / 60.0
            }
            None => s.trim().parse().with_context(|| format!("bad decimal hour `{s}`"))?,
        };
        ensure!((0.0..=24.0).contains(&hour), "hour is out of range in `{s}`");
        Ok(Self(normalize_hour(hour)))
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (hour, minute) = split_hour_minute(self.0);
        write!(f, "{hour:02}:{minute:02}")
    }
}

impl Debug for ClockTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Daily recurring clock period, half-open.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Period {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl Period {
    #[must_use]
    pub const fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(self, hour: f64) -> bool {
        hour_in_period(hour, self.start.0, self.end.0)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        normalize_hour(self.start.0) == normalize_hour(self.end.0)
    }

    #[must_use]
    pub fn duration(self) -> Hours {
        Hours((self.end.0 - self.start.0).rem_euclid(24.0))
    }
}

/// Local clock offset in whole hours, e.g. `1` while summer time is in effect.
///
/// The rule is regional, hence a trait.
pub trait DaylightSaving: Send + Sync {
    fn offset(&self, at: NaiveDateTime) -> i32;
}

/// Clocks go forward at 01:00 on the last Sunday of March, and back at 02:00 on the last Sunday
/// of October.
pub struct EuropeanSummerTime;

impl DaylightSaving for EuropeanSummerTime {
    fn offset(&self, at: NaiveDateTime) -> i32 {
        let year = at.year();
        let (Some(spring), Some(autumn)) = (last_sunday(year, 3), last_sunday(year, 10)) else {
            return 0;
        };
        let starts_at = spring.and_time(NaiveTime::MIN) + chrono::TimeDelta::hours(1);
        let ends_at = autumn.and_time(NaiveTime::MIN) + chrono::TimeDelta::hours(2);
        i32::from((starts_at <= at) && (at < ends_at))
    }
}

pub struct NoDaylightSaving;

impl DaylightSaving for NoDaylightSaving {
    fn offset(&self, _at: NaiveDateTime) -> i32 {
        0
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DaylightSavingRule {
    #[default]
    European,
    None,
}

impl From<DaylightSavingRule> for Box<dyn DaylightSaving> {
    fn from(rule: DaylightSavingRule) -> Self {
        match rule {
            DaylightSavingRule::European => Box::new(EuropeanSummerTime),
            DaylightSavingRule::None => Box::new(NoDaylightSaving),
        }
    }
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.checked_sub_days(Days::new(1))?;
    last.checked_sub_days(Days::new(u64::from(last.weekday().num_days_from_sunday())))
}

/// Chrono weekday that can live in an [`enumset::EnumSet`].
#[derive(
    Debug,
    Hash,
    PartialOrd,
    Ord,
    enumset::EnumSetType,
    serde::Serialize,
    serde::Deserialize,
)]
#[enumset(serialize_repr = "list")]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_normalize_hour() {
        assert_abs_diff_eq!(normalize_hour(25.5), 1.5);
        assert_abs_diff_eq!(normalize_hour(-1.0), 23.0);
        assert_abs_diff_eq!(normalize_hour(23.9999), 0.0);
        assert_abs_diff_eq!(normalize_hour(1.0 + 29.6 / 60.0), 1.5);
    }

    #[test]
    fn test_split_hour_minute() {
        assert_eq!(split_hour_minute(2.5), (2, 30));
        assert_eq!(split_hour_minute(23.0 + 59.0 / 60.0), (23, 59));
        assert_eq!(split_hour_minute(26.25), (2, 15));
    }

    #[test]
    fn test_hour_in_period() {
        assert!(hour_in_period(3.0, 2.0, 5.0));
        assert!(!hour_in_period(5.0, 2.0, 5.0));
        assert!(hour_in_period(23.5, 23.0, 2.0));
        assert!(hour_in_period(1.0, 23.0, 2.0));
        assert!(!hour_in_period(12.0, 23.0, 2.0));
        assert!(!hour_in_period(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_overlap() {
        assert_abs_diff_eq!(overlap(2.0..3.0, 2.5..4.0), 0.5);
        assert_abs_diff_eq!(overlap(2.0..3.0, 3.0..4.0), 0.0);
        assert_abs_diff_eq!(overlap(0.0..10.0, 2.0..3.0), 1.0);
    }

    #[test]
    fn test_start_of_hour() {
        assert_eq!(start_of_hour(at(2025, 11, 16, 14, 59)), at(2025, 11, 16, 14, 0));
    }

    #[test]
    fn test_clock_time_parse() {
        assert_eq!("02:30".parse::<ClockTime>().unwrap(), ClockTime(2.5));
        assert_eq!("23.75".parse::<ClockTime>().unwrap(), ClockTime(23.75));
        assert!("25:00".parse::<ClockTime>().is_err());
        assert!("02:75".parse::<ClockTime>().is_err());
        assert_eq!(ClockTime::from_hm(5, 45).to_string(), "05:45");
        assert_eq!(ClockTime::of(at(2025, 11, 16, 23, 59)).to_string(), "23:59");
    }

    #[test]
    fn test_period_duration_wraps() {
        let period = Period::new(ClockTime(23.0), ClockTime(5.0));
        assert_abs_diff_eq!(period.duration().0, 6.0);
        assert!(Period::new(ClockTime(4.0), ClockTime(4.0)).is_empty());
    }

    #[test]
    fn test_european_summer_time() {
        let rule = EuropeanSummerTime;
        // 2025: clocks change on March 30 and October 26.
        assert_eq!(rule.offset(at(2025, 3, 30, 0, 59)), 0);
        assert_eq!(rule.offset(at(2025, 3, 30, 1, 0)), 1);
        assert_eq!(rule.offset(at(2025, 7, 1, 12, 0)), 1);
        assert_eq!(rule.offset(at(2025, 10, 26, 1, 59)), 1);
        assert_eq!(rule.offset(at(2025, 10, 26, 2, 0)), 0);
        assert_eq!(rule.offset(at(2025, 12, 24, 12, 0)), 0);
    }

    #[test]
    fn test_no_daylight_saving() {
        assert_eq!(NoDaylightSaving.offset(at(2025, 7, 1, 12, 0)), 0);
    }
}
