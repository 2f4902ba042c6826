//! Charge planning configuration.
//!
//! Every option has a default, so an empty TOML document is a valid configuration.

use std::{
    fmt::{Display, Formatter},
    path::Path,
    str::FromStr,
};

use chrono::{Datelike, NaiveDate};
use enumset::EnumSet;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{
    core::{
        clock::{ClockTime, DayOfWeek, DaylightSavingRule, Period},
        demand::ProfileShape,
        generation::{ForecastService, ForecastSource},
        working_mode::TimedWorkMode,
    },
    error::PlanError,
    prelude::*,
    quantity::{
        electric::{Amperes, Ohms, Volts},
        energy::KilowattHours,
        power::{Kilowatts, Watts},
        proportions::Percent,
        temperature::Celsius,
        time::Hours,
    },
};

/// Open-circuit voltage of a 16-cell LiFePO4 pack at 0%, 10%, …, 100% state-of-charge.
pub const LIFEPO4_CURVE: [Volts; 11] = [
    Volts(51.30),
    Volts(52.00),
    Volts(52.30),
    Volts(52.40),
    Volts(52.50),
    Volts(52.60),
    Volts(52.70),
    Volts(52.80),
    Volts(52.90),
    Volts(53.10),
    Volts(53.50),
];

/// Relative monthly consumption, January first.
pub const SEASONALITY: [f64; 12] = [1.1, 1.1, 1.0, 1.0, 0.9, 0.9, 0.9, 0.9, 1.0, 1.0, 1.1, 1.2];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargeConfig {
    /// Low-tariff windows, at most two (AM and PM).
    pub windows: Vec<ChargeWindow>,

    /// Safety margin on the daily consumption.
    pub contingency: Percent,

    /// Safety margin used instead of [`ChargeConfig::contingency`] on special days.
    pub special_contingency: Percent,

    pub special_days: Vec<MonthDay>,

    /// Overrides the capacity derived from the residual energy and state-of-charge.
    pub capacity: Option<KilowattHours>,

    /// Overrides the device minimum state-of-charge on grid.
    pub min_soc: Option<Percent>,

    pub max_soc: Percent,

    /// Charge to this state-of-charge by the end of the window, regardless of the forecasts.
    pub target_soc: Option<Percent>,

    pub charge_current: Option<Amperes>,
    pub discharge_current: Option<Amperes>,

    /// Export power cap applied while the inverter is in the Feedin work mode.
    pub export_limit: Option<Kilowatts>,

    /// PV to battery loss factor.
    pub pv_loss: f64,

    /// Grid to battery loss factor.
    pub grid_loss: f64,

    /// Battery to load loss factor.
    pub discharge_loss: f64,

    /// Fixed charging efficiency, otherwise estimated from the battery resistance.
    pub charge_loss: Option<f64>,

    /// BMS and inverter stand-by draw.
    pub bms_power: Watts,

    pub bat_resistance: Ohms,
    pub volt_curve: [Volts; 11],

    /// State-of-charge at which [`ChargeConfig::bat_resistance`] is specified.
    pub nominal_soc: Percent,

    pub seasonality: [f64; 12],
    pub consumption_profile: ProfileShape,
    pub annual_consumption: Option<KilowattHours>,

    /// Manual daily consumption.
    pub consumption: Option<KilowattHours>,

    pub consumption_days: usize,
    pub consumption_span: ConsumptionSpan,
    pub generation_days: usize,

    /// Shortest charge worth scheduling.
    pub min_hours: Hours,

    /// Smallest shortfall worth charging for.
    pub min_kwh: KilowattHours,

    pub full_charge: Option<FullChargeTrigger>,

    /// Charging is derated at or below this temperature.
    pub derate_temp: Celsius,
    pub derate_step: Celsius,

    /// Maximum charge current per derating step, warmest first.
    pub derating: Vec<Amperes>,

    pub forecast_adjust: ForecastAdjust,
    pub preferred_forecast: ForecastService,
    pub force: ForcePolicy,
    pub timed_mode: Vec<TimedWorkMode>,
    pub daylight_saving: DaylightSavingRule,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            windows: vec![ChargeWindow::new(ClockTime(2.0), ClockTime(5.0))],
            contingency: Percent(20.0),
            special_contingency: Percent(30.0),
            special_days: vec![MonthDay::new(12, 25), MonthDay::new(12, 26), MonthDay::new(1, 1)],
            capacity: None,
            min_soc: None,
            max_soc: Percent::HUNDRED,
            target_soc: None,
            charge_current: None,
            discharge_current: None,
            export_limit: None,
            pv_loss: 0.95,
            grid_loss: 0.976,
            discharge_loss: 0.97,
            charge_loss: None,
            bms_power: Watts(50.0),
            bat_resistance: Ohms(0.072),
            volt_curve: LIFEPO4_CURVE,
            nominal_soc: Percent(55.0),
            seasonality: SEASONALITY,
            consumption_profile: ProfileShape::Medium,
            annual_consumption: None,
            consumption: None,
            consumption_days: 3,
            consumption_span: ConsumptionSpan::Days,
            generation_days: 3,
            min_hours: Hours(0.25),
            min_kwh: KilowattHours(0.5),
            full_charge: None,
            derate_temp: Celsius(21.0),
            derate_step: Celsius(5.0),
            derating: vec![Amperes(24.0), Amperes(15.0), Amperes(10.0), Amperes(2.0)],
            forecast_adjust: ForecastAdjust::default(),
            preferred_forecast: ForecastService::Solcast,
            force: ForcePolicy::None,
            timed_mode: Vec::new(),
            daylight_saving: DaylightSavingRule::European,
        }
    }
}

impl ChargeConfig {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read `{}`", path.as_ref().display()))?;
        let config = Self::from_toml_str(&text)?;
        info!(n_windows = config.windows.len(), "loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("failed to parse the charge config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the overrides for sanity.
    pub fn validate(&self) -> Result<(), PlanError> {
        let bad = |message: String| Err(PlanError::Configuration(message));

        if let Some(min_soc) = self.min_soc
            && !(Percent(10.0)..=Percent::HUNDRED).contains(&min_soc)
        {
            return bad(format!("`min_soc` must be within 10..=100, got {min_soc}"));
        }
        let min_soc = self.min_soc.unwrap_or(Percent(10.0));
        if self.max_soc <= min_soc || self.max_soc > Percent::HUNDRED {
            return bad(format!("`max_soc` must be within {min_soc}..=100%, got {}", self.max_soc));
        }
        if let Some(target_soc) = self.target_soc
            && (target_soc > self.max_soc || target_soc < Percent::ZERO)
        {
            return bad(format!("`target_soc` {target_soc} exceeds `max_soc` {}", self.max_soc));
        }
        if self.contingency < Percent::ZERO || self.special_contingency < Percent::ZERO {
            return bad("contingency cannot be negative".to_string());
        }
        for (name, factor) in [
            ("pv_loss", self.pv_loss),
            ("grid_loss", self.grid_loss),
            ("discharge_loss", self.discharge_loss),
            ("charge_loss", self.charge_loss.unwrap_or(1.0)),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                return bad(format!("`{name}` must be within (0, 1], got {factor}"));
            }
        }
        if let Some(capacity) = self.capacity
            && capacity <= KilowattHours::ZERO
        {
            return bad(format!("`capacity` must be positive, got {capacity}"));
        }
        if self.derate_step <= Celsius::ZERO {
            return bad(format!("`derate_step` must be positive, got {}", self.derate_step));
        }
        if self.consumption_days == 0 || self.generation_days == 0 {
            return bad("history depth must be at least one day".to_string());
        }
        if self.min_hours < Hours::ZERO || self.min_kwh < KilowattHours::ZERO {
            return bad("minimum charge thresholds cannot be negative".to_string());
        }
        if self.seasonality.iter().any(|weight| *weight < 0.0)
            || self.seasonality.iter().sum::<f64>() <= 0.0
        {
            return bad("`seasonality` weights must be non-negative and not all zero".to_string());
        }
        if let Some(FullChargeTrigger::DayOfMonth(day)) = self.full_charge
            && !(1..=31).contains(&day)
        {
            return bad(format!("full charge day of month is out of range: {day}"));
        }

        if self.windows.is_empty() || self.windows.len() > 2 {
            return Err(PlanError::WindowConflict(format!(
                "expected one or two charge windows, got {}",
                self.windows.len()
            )));
        }
        for window in &self.windows {
            if window.period().is_empty() {
                return Err(PlanError::WindowConflict(format!(
                    "window {:?} has zero length",
                    window.period()
                )));
            }
        }
        if let [first, second] = self.windows.as_slice()
            && (first.period().contains(second.start.0) || second.period().contains(first.start.0))
        {
            return Err(PlanError::WindowConflict("charge windows overlap".to_string()));
        }
        Ok(())
    }

    /// Contingency that applies to the specified day.
    #[must_use]
    pub fn contingency_on(&self, date: NaiveDate) -> Percent {
        if self.special_days.iter().any(|day| day.matches(date)) {
            self.special_contingency
        } else {
            self.contingency
        }
    }
}

/// Daily recurring low-tariff charge window.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChargeWindow {
    pub start: ClockTime,
    pub end: ClockTime,

    /// The inverter is forced to charge (or hold) for the entire window.
    #[serde(default)]
    pub forced: bool,

    /// Overrides [`ChargeConfig::min_hours`] for this window.
    #[serde(default)]
    pub min_duration: Option<Hours>,
}

impl ChargeWindow {
    #[must_use]
    pub const fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end, forced: false, min_duration: None }
    }

    #[must_use]
    pub const fn period(&self) -> Period {
        Period::new(self.start, self.end)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumptionSpan {
    /// Consecutive days.
    #[default]
    Days,

    /// Same weekday over consecutive weeks.
    Weeks,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullChargeTrigger {
    Daily,
    Weekdays(EnumSet<DayOfWeek>),
    DayOfMonth(u32),
}

impl FullChargeTrigger {
    #[must_use]
    pub fn is_active_on(self, date: NaiveDate) -> bool {
        match self {
            Self::Daily => true,
            Self::Weekdays(weekdays) => weekdays.contains(DayOfWeek::from(date.weekday())),
            Self::DayOfMonth(day) => date.day() == day,
        }
    }
}

/// What to do for the rest of the window after the charge has finished.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForcePolicy {
    /// Let the inverter work normally.
    #[default]
    None,

    /// Hold the battery: no discharge until the window ends.
    Hold,
}

/// Forecast adjustment per source.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastAdjust {
    pub solcast: Percent,
    pub solar: Percent,
    pub manual: Percent,
    pub historical: Percent,
}

impl Default for ForecastAdjust {
    fn default() -> Self {
        Self {
            solcast: Percent::HUNDRED,
            solar: Percent::HUNDRED,
            manual: Percent::HUNDRED,
            historical: Percent::HUNDRED,
        }
    }
}

impl ForecastAdjust {
    #[must_use]
    pub const fn get(&self, source: ForecastSource) -> Percent {
        match source {
            ForecastSource::Manual => self.manual,
            ForecastSource::Solcast => self.solcast,
            ForecastSource::Solar => self.solar,
            ForecastSource::Historical => self.historical,
        }
    }
}

/// Calendar day regardless of the year, `MM-DD`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, SerializeDisplay, DeserializeFromStr)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    #[must_use]
    pub const fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    #[must_use]
    pub fn matches(self, date: NaiveDate) -> bool {
        (date.month() == self.month) && (date.day() == self.day)
    }
}

impl FromStr for MonthDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (month, day) = s.split_once('-').with_context(|| format!("expected `MM-DD`: `{s}`"))?;
        let this = Self::new(month.parse()?, day.parse()?);
        ensure!((1..=12).contains(&this.month) && (1..=31).contains(&this.day), "bad date `{s}`");
        Ok(this)
    }
}

impl Display for MonthDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}
