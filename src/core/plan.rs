use std::ops::Range;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{
    core::{
        clock::ClockTime,
        demand::DemandSource,
        generation::ForecastSource,
        simulator::Simulation,
        timeline::Timeline,
        window::SelectedWindow,
    },
    quantity::{energy::KilowattHours, proportions::Percent, time::Hours},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    NoChargeNeeded,
    Charge,

    /// Charge for as long as the window allows.
    FullCharge,
}

/// Outcome of a planning run.
///
/// Timestamps are in the simulation clock, that is the local time as of now.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Plan {
    pub decision: Decision,

    /// Energy to add on top of the baseline before the window ends.
    pub charge_needed: KilowattHours,

    /// Energy the planned charge adds by the end of the window.
    pub charge_added: KilowattHours,

    pub duration: Hours,

    /// Grid charging, [`None`] when no charge is needed.
    pub charge: Option<Range<NaiveDateTime>>,

    /// Rest of the window where the battery is held.
    pub hold: Option<Range<NaiveDateTime>>,

    pub start_time: ClockTime,
    pub end_time: ClockTime,

    /// Lowest projected balance after the window, and its wall-clock hour.
    pub projected_min_residual: KilowattHours,
    pub projected_min_hour: u32,

    pub forecast_source: ForecastSource,
    pub demand_source: DemandSource,

    pub start_soc: Percent,
    pub end_soc: Percent,

    pub window: SelectedWindow,

    /// The inverter settings may be updated.
    pub update_allowed: bool,

    pub timeline: Timeline,
    pub baseline: Simulation,

    /// [`None`] when no charge is needed.
    pub augmented: Option<Simulation>,
}
