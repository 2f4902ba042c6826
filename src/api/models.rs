//! Records returned by the device and forecast collaborators.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::quantity::{
    electric::{Amperes, Volts},
    energy::KilowattHours,
    power::Kilowatts,
    proportions::Percent,
    temperature::Celsius,
};

/// Raw battery readings.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatteryTelemetry {
    #[serde(rename = "soc")]
    pub state_of_charge: Percent,

    #[serde(rename = "residual")]
    pub residual_energy: KilowattHours,

    pub voltage: Volts,

    /// Negative while charging.
    pub current: Amperes,

    pub temperature: Celsius,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinSoc {
    /// Minimum state-of-charge while off-grid.
    #[serde(rename = "minSoc")]
    pub min_soc: Percent,

    /// Minimum state-of-charge the inverter discharges down to while on-grid.
    #[serde(rename = "minSocOnGrid")]
    pub min_soc_on_grid: Percent,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceRating {
    pub power: Kilowatts,

    #[serde(rename = "maxChargeCurrent")]
    pub max_charge_current: Amperes,
}

/// Hourly energy over a single day: consumption, PV generation or a forecast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyEnergy {
    pub date: NaiveDate,
    pub hourly: [KilowattHours; 24],
    pub total: KilowattHours,
}

impl DailyEnergy {
    /// Spread the total evenly across the day.
    #[cfg(test)]
    #[must_use]
    pub fn flat(date: NaiveDate, total: KilowattHours) -> Self {
        Self { date, hourly: [total / 24.0; 24], total }
    }

    /// Usable for averaging: finite, non-negative and not an empty day.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.total.is_finite()
            && self.total > KilowattHours::ZERO
            && self.hourly.iter().all(|energy| energy.is_finite() && *energy >= KilowattHours::ZERO)
    }
}
