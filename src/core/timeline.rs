//! Per-hour energy flows over the planning horizon.

use bon::bon;
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::Serialize;

use crate::{
    config::{ChargeConfig, ForcePolicy},
    core::{
        battery::BatteryModel,
        clock::{DaylightSaving, overlap, start_of_hour},
        demand::{DemandProfile, timed},
        generation::GenerationProfile,
        window::SelectedWindow,
        working_mode::{WorkMode, work_mode_at},
    },
    quantity::{energy::KilowattHours, power::Kilowatts, time::Hours},
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct HourlyStep {
    /// Wall-clock hour, shifted for daylight saving. The index itself is never shifted.
    pub clock_hour: u32,

    pub generation: KilowattHours,
    pub consumption: KilowattHours,

    /// Energy available for charging the battery.
    pub charge: KilowattHours,

    /// Energy drawn from the battery.
    pub discharge: KilowattHours,

    pub work_mode: WorkMode,

    /// Part of the hour where the battery is held and only the standby draw applies.
    pub held: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Timeline {
    /// Start of the current hour, index zero.
    pub starts_at: NaiveDateTime,

    /// Part of the current hour that has already passed.
    pub elapsed: Hours,

    /// BMS and inverter draw per hour.
    pub standby: KilowattHours,

    pub steps: Vec<HourlyStep>,
}

#[bon]
impl Timeline {
    #[builder]
    pub fn new(
        now: NaiveDateTime,
        n_hours: usize,
        window: &SelectedWindow,
        battery: &BatteryModel,
        demand: &DemandProfile,
        generation: &GenerationProfile,
        config: &ChargeConfig,
        daylight_saving: &dyn DaylightSaving,
    ) -> Self {
        let starts_at = start_of_hour(now);
        let elapsed = Hours::from(now - starts_at);
        let standby = config.bms_power * Hours::ONE;
        let charge_limit = battery.limits.charge * Hours::ONE;
        let discharge_limit = battery.limits.discharge * Hours::ONE;
        let export_limit = config.export_limit.map(|limit| limit * Hours::ONE);
        let base_offset = daylight_saving.offset(now);
        let hold = window.window.forced || config.force == ForcePolicy::Hold;

        let consumption = timed(&demand.hourly, starts_at.hour(), n_hours);
        let steps = consumption
            .into_iter()
            .enumerate()
            .map(|(i, consumption)| {
                #[expect(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                let timestamp = starts_at + TimeDelta::hours(i as i64);
                let hour_of_day = timestamp.hour();
                let shift = daylight_saving.offset(timestamp) - base_offset;
                #[expect(clippy::cast_sign_loss)]
                let clock_hour = (i64::from(hour_of_day) + i64::from(shift)).rem_euclid(24) as u32;

                let work_mode = work_mode_at(&config.timed_mode, f64::from(hour_of_day));
                let generation = generation.at(timestamp);
                let exportable = match (work_mode, export_limit) {
                    (WorkMode::Feedin, Some(export_limit)) => {
                        (generation - export_limit).max(KilowattHours::ZERO)
                    }
                    (WorkMode::Feedin, None) => KilowattHours::ZERO,
                    _ => generation,
                };
                let charge = (exportable * config.pv_loss).min(charge_limit);

                #[expect(clippy::cast_precision_loss)]
                let held = if hold {
                    overlap(i as f64..(i + 1) as f64, window.start..window.end)
                } else {
                    0.0
                };
                let discharge = match work_mode {
                    WorkMode::Backup => standby,
                    WorkMode::SelfUse | WorkMode::Feedin => {
                        let free = (consumption / config.discharge_loss + standby).min(discharge_limit);
                        free * (1.0 - held) + standby * held
                    }
                };

                HourlyStep { clock_hour, generation, consumption, charge, discharge, work_mode, held }
            })
            .collect();

        Self { starts_at, elapsed, standby, steps }
    }
}

impl Timeline {
    /// Wall-clock hour label of the hour boundary, which may lie right after the last step.
    #[must_use]
    pub fn clock_hour_at(&self, index: usize) -> u32 {
        match self.steps.get(index) {
            Some(step) => step.clock_hour,
            None => self.steps.last().map_or(0, |step| {
                let beyond = u32::try_from(index + 1 - self.steps.len()).unwrap_or(0);
                (step.clock_hour + beyond % 24) % 24
            }),
        }
    }

    /// Battery discharge rate over the hour at the axis position.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn discharge_rate_at(&self, position: f64) -> Kilowatts {
        self.steps
            .get(position.max(0.0).floor() as usize)
            .map_or(Kilowatts::ZERO, |step| Kilowatts(step.discharge.0))
    }
}
