use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::core::clock::{ClockTime, Period};

/// Inverter work modes per FoxESS API that affect the battery energy balance.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum WorkMode {
    /// Charge on excess PV power, discharge on insufficient PV power.
    #[default]
    #[serde(rename = "SelfUse")]
    SelfUse,

    /// Export PV power first, up to the export limit, and only charge from the excess.
    #[serde(rename = "Feedin")]
    Feedin,

    /// Keep the battery for outages: no discharging.
    #[serde(rename = "Backup")]
    Backup,
}

impl Display for WorkMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfUse => write!(f, "Self-use"),
            Self::Feedin => write!(f, "Feed-in priority"),
            Self::Backup => write!(f, "Back-up"),
        }
    }
}

/// Work mode override for a daily period.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedWorkMode {
    pub start: ClockTime,
    pub end: ClockTime,
    pub mode: WorkMode,
}

impl TimedWorkMode {
    #[must_use]
    pub const fn period(&self) -> Period {
        Period::new(self.start, self.end)
    }
}

/// Work mode in effect at the hour of day, the first matching override wins.
#[must_use]
pub fn work_mode_at(overrides: &[TimedWorkMode], hour: f64) -> WorkMode {
    overrides
        .iter()
        .find(|timed| timed.period().contains(hour))
        .map_or(WorkMode::SelfUse, |timed| timed.mode)
}
