//! Plan conversion into the FoxESS charge-period settings, and pushing them to the device.

use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

use bon::Builder;
use chrono::{DurationRound, NaiveDateTime, NaiveTime, TimeDelta};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    api::Device,
    core::{
        clock::{DaylightSaving, decimal_hour, split_hour_minute},
        plan::Plan,
    },
    prelude::*,
};

/// FoxESS Cloud offers exactly two charge periods.
const N_PERIODS: usize = 2;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HourMinute {
    pub hour: u32,
    pub minute: u32,
}

impl HourMinute {
    pub const MIDNIGHT: Self = Self { hour: 0, minute: 0 };

    /// End times are exclusive, but FoxESS Cloud won't accept `00:00`.
    pub const END_OF_DAY: Self = Self { hour: 23, minute: 59 };

    #[must_use]
    pub fn of(timestamp: NaiveDateTime) -> Self {
        let (hour, minute) = split_hour_minute(decimal_hour(timestamp));
        Self { hour, minute }
    }
}

impl Display for HourMinute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeTimes {
    pub enable1: bool,
    pub start_time1: HourMinute,
    pub end_time1: HourMinute,

    pub enable2: bool,
    pub start_time2: HourMinute,
    pub end_time2: HourMinute,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct ChargePeriod {
    is_enabled: bool,
    start: HourMinute,
    end: HourMinute,
}

impl ChargeTimes {
    /// Convert the plan into the two device periods.
    ///
    /// The charge goes first and is enabled, the hold follows disabled. Periods crossing midnight
    /// take both slots, anything that does not fit is dropped.
    #[must_use]
    pub fn from_plan(plan: &Plan, daylight_saving: &dyn DaylightSaving, now: NaiveDateTime) -> Self {
        let base_offset = daylight_saving.offset(now);
        let wall_clock = |timestamp: NaiveDateTime| {
            timestamp + TimeDelta::hours(i64::from(daylight_saving.offset(timestamp) - base_offset))
        };

        let periods = plan
            .charge
            .iter()
            .map(|period| (true, period))
            .chain(plan.hold.iter().map(|period| (false, period)))
            .filter(|(_, period)| period.start < period.end)
            .flat_map(|(is_enabled, period)| {
                split_at_midnight(wall_clock(period.start)..wall_clock(period.end))
                    .into_iter()
                    .map(move |(start, end)| ChargePeriod { is_enabled, start, end })
            })
            .collect_vec();
        if periods.len() > N_PERIODS {
            warn!(n_periods = periods.len(), "only two periods fit, dropping the rest");
        }

        let mut periods = periods.into_iter();
        let first = periods.next();
        let second = periods.next();
        Self {
            enable1: first.is_some_and(|period| period.is_enabled),
            start_time1: first.map_or(HourMinute::MIDNIGHT, |period| period.start),
            end_time1: first.map_or(HourMinute::MIDNIGHT, |period| period.end),
            enable2: second.is_some_and(|period| period.is_enabled),
            start_time2: second.map_or(HourMinute::MIDNIGHT, |period| period.start),
            end_time2: second.map_or(HourMinute::MIDNIGHT, |period| period.end),
        }
    }
}

impl Display for ChargeTimes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let flag = |is_enabled: bool| if is_enabled { "on" } else { "off" };
        write!(
            f,
            "{} {}-{}, {} {}-{}",
            flag(self.enable1),
            self.start_time1,
            self.end_time1,
            flag(self.enable2),
            self.start_time2,
            self.end_time2,
        )
    }
}

fn round_to_minute(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.duration_round(TimeDelta::minutes(1)).unwrap_or(timestamp)
}

/// Split the wall-clock period into same-day parts, at most two.
///
/// Rounding happens first, so a start rounded up to midnight belongs to the next day.
fn split_at_midnight(period: Range<NaiveDateTime>) -> Vec<(HourMinute, HourMinute)> {
    let (start, end) = (round_to_minute(period.start), round_to_minute(period.end));
    let midnight = start.date().succ_opt().map_or(end, |date| date.and_time(NaiveTime::MIN));

    let parts = if end <= midnight {
        vec![(HourMinute::of(start), HourMinute::of(end))]
    } else {
        vec![
            (HourMinute::of(start), HourMinute::END_OF_DAY),
            (HourMinute::MIDNIGHT, HourMinute::of(end)),
        ]
    };
    parts
        .into_iter()
        .map(|(start, end)| {
            if end == HourMinute::MIDNIGHT { (start, HourMinute::END_OF_DAY) } else { (start, end) }
        })
        .filter(|(start, end)| start != end)
        .collect()
}

/// Pushes the plan to the device, unless told not to.
#[derive(Builder)]
pub struct ScheduleEmitter<'a> {
    device: &'a dyn Device,
    serial_number: &'a str,
    daylight_saving: &'a dyn DaylightSaving,

    /// Actually update the device settings, otherwise it is a dry run.
    #[builder(default)]
    update: bool,
}

impl ScheduleEmitter<'_> {
    /// Returns the settings, [`None`] when there is nothing to set.
    #[instrument(skip_all, fields(serial_number = self.serial_number))]
    pub async fn emit(&self, plan: &Plan, now: NaiveDateTime) -> Result<Option<ChargeTimes>> {
        if plan.charge.is_none() && plan.hold.is_none() {
            info!("no charge needed, leaving the device settings as they are");
            return Ok(None);
        }

        let charge_times = ChargeTimes::from_plan(plan, self.daylight_saving, now);
        info!(%charge_times, "compiled");

        if !self.update {
            info!("dry run, the device is not updated");
        } else if !plan.update_allowed {
            warn!("too close to a window boundary, the device is not updated");
        } else {
            self.device
                .set_charge_times(self.serial_number, &charge_times)
                .await
                .context("failed to set the charge times")?;
            info!("updated");
        }
        Ok(Some(charge_times))
    }
}
