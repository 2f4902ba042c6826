//! Charge window selection relative to the current moment.

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::Serialize;

use crate::{
    config::ChargeWindow,
    core::clock::decimal_hour,
    error::PlanError,
    prelude::*,
    quantity::time::Hours,
};

/// Settings are not touched this close to a window boundary.
pub const BOUNDARY_GUARD: Hours = Hours(0.25);

/// The charge window to plan for, placed on the simulation axis.
///
/// The axis is in hours since the start of the current hour.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct SelectedWindow {
    pub window: ChargeWindow,

    /// Position of the window start, equal to the elapsed part of the current hour when the
    /// window is already open.
    pub start: f64,

    pub end: f64,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,

    /// Whether the inverter settings may be updated right now.
    pub update_allowed: bool,
}

impl SelectedWindow {
    #[must_use]
    pub fn length(&self) -> Hours {
        Hours(self.end - self.start)
    }

    /// Simulation hour index at which the window has fully ended.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn end_index(&self) -> usize {
        self.end.ceil() as usize
    }
}

/// Pick the window that starts sooner, an open window starts now.
#[instrument(skip_all, fields(now = %now))]
pub fn select(windows: &[ChargeWindow], now: NaiveDateTime) -> Result<SelectedWindow, PlanError> {
    let hour = decimal_hour(now);
    let elapsed = hour - f64::from(now.hour());

    let (window, until_start, until_end) = windows
        .iter()
        .map(|window| {
            let period = window.period();
            if period.contains(hour) {
                (window, 0.0, (window.end.0 - hour).rem_euclid(24.0))
            } else {
                let until_start = (window.start.0 - hour).rem_euclid(24.0);
                (window, until_start, until_start + period.duration().0)
            }
        })
        .min_by(|(_, lhs, _), (_, rhs, _)| lhs.total_cmp(rhs))
        .ok_or_else(|| PlanError::WindowConflict("no charge window configured".to_string()))?;

    let update_allowed = !windows.iter().any(|window| {
        [window.start.0, window.end.0].into_iter().any(|boundary| {
            let distance = (hour - boundary).rem_euclid(24.0);
            distance.min(24.0 - distance) < BOUNDARY_GUARD.0
        })
    });

    let starts_at = now + TimeDelta::from(Hours(until_start));
    let ends_at = now + TimeDelta::from(Hours(until_end));
    let this = SelectedWindow {
        window: *window,
        start: elapsed + until_start,
        end: elapsed + until_end,
        starts_at,
        ends_at,
        update_allowed,
    };
    info!(start = %this.window.start, end = %this.window.end, %starts_at, update_allowed, "selected");
    Ok(this)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::core::clock::ClockTime;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 16).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn windows() -> [ChargeWindow; 2] {
        [
            ChargeWindow::new(ClockTime(2.0), ClockTime(5.0)),
            ChargeWindow::new(ClockTime(13.0), ClockTime(16.0)),
        ]
    }

    #[test]
    fn test_next_window() {
        let selected = select(&windows(), at(10, 30)).unwrap();
        assert_eq!(selected.window.start, ClockTime(13.0));
        assert_abs_diff_eq!(selected.start, 3.0);
        assert_abs_diff_eq!(selected.end, 6.0);
        assert_eq!(selected.end_index(), 6);
        assert!(selected.update_allowed);
    }

    #[test]
    fn test_wraps_to_tomorrow() {
        let selected = select(&windows(), at(18, 0)).unwrap();
        assert_eq!(selected.window.start, ClockTime(2.0));
        assert_abs_diff_eq!(selected.start, 8.0);
        assert_eq!(selected.ends_at, at(5, 0) + TimeDelta::days(1));
    }

    #[test]
    fn test_open_window_starts_now() {
        let selected = select(&windows(), at(3, 15)).unwrap();
        assert_eq!(selected.window.start, ClockTime(2.0));
        assert_abs_diff_eq!(selected.start, 0.25);
        assert_abs_diff_eq!(selected.end, 2.0);
        assert_abs_diff_eq!(selected.length().0, 1.75);
        assert!(selected.update_allowed);
    }

    #[test]
    fn test_window_across_midnight() {
        let windows = [ChargeWindow::new(ClockTime(23.0), ClockTime(5.0))];
        let selected = select(&windows, at(0, 30)).unwrap();
        assert_abs_diff_eq!(selected.start, 0.5);
        assert_abs_diff_eq!(selected.end, 5.0);
        assert_eq!(selected.ends_at, at(5, 0));
    }

    #[test]
    fn test_boundary_guard() {
        assert!(!select(&windows(), at(1, 50)).unwrap().update_allowed);
        assert!(!select(&windows(), at(5, 10)).unwrap().update_allowed);
        assert!(select(&windows(), at(5, 15)).unwrap().update_allowed);
    }
}
