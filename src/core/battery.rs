//! Battery electrical model: capacity, open-circuit voltage, resistance and power limits.

use serde::Serialize;

use crate::{
    api::models::{BatteryTelemetry, DeviceRating, MinSoc},
    config::ChargeConfig,
    error::PlanError,
    prelude::*,
    quantity::{
        electric::{Amperes, Ohms, Volts},
        energy::KilowattHours,
        power::Kilowatts,
        proportions::Percent,
        temperature::Celsius,
    },
};

/// Conservative fallback for inverters with an unknown rating.
pub const DEFAULT_RATING: DeviceRating =
    DeviceRating { power: Kilowatts(3.0), max_charge_current: Amperes(25.0) };

/// Anything below is not worth calling a charge.
const MIN_CHARGE_POWER: Kilowatts = Kilowatts(0.1);

/// Battery state estimated from the telemetry, immutable for the rest of the planning run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct BatteryState {
    pub state_of_charge: Percent,
    pub residual_energy: KilowattHours,
    pub capacity: KilowattHours,
    pub voltage: Volts,

    /// Negative while charging.
    pub current: Amperes,

    pub temperature: Celsius,
    pub internal_resistance: Ohms,
    pub open_circuit_voltage: Volts,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PowerLimits {
    pub charge_current: Amperes,
    pub discharge_current: Amperes,

    /// Grid charging power as seen by the battery.
    pub charge: Kilowatts,

    pub discharge: Kilowatts,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct BatteryModel {
    pub state: BatteryState,
    pub limits: PowerLimits,

    /// Fraction of the charging energy that ends up stored.
    pub charge_efficiency: f64,

    /// Minimum state-of-charge while off-grid.
    pub min_soc: Percent,

    /// Minimum state-of-charge while on-grid.
    pub min_soc_on_grid: Percent,

    pub max_soc: Percent,

    /// The battery is too cold for a rate-limited charge, so it should be charged in full.
    pub needs_full_charge: bool,
}

impl BatteryModel {
    #[instrument(skip_all)]
    pub fn try_new(
        telemetry: &BatteryTelemetry,
        min_soc: MinSoc,
        rating: Option<DeviceRating>,
        config: &ChargeConfig,
    ) -> Result<Self, PlanError> {
        let soc = telemetry.state_of_charge;
        if !soc.is_finite() || soc < Percent::ZERO || soc > Percent::HUNDRED {
            return Err(PlanError::InsufficientData(format!("state-of-charge {soc} is invalid")));
        }
        if !telemetry.residual_energy.is_finite() || telemetry.residual_energy < KilowattHours::ZERO
        {
            return Err(PlanError::InsufficientData(format!(
                "residual energy {} is invalid",
                telemetry.residual_energy,
            )));
        }

        let capacity = match config.capacity {
            Some(capacity) => capacity,
            None if soc > Percent::ZERO => telemetry.residual_energy * 100.0 / soc.0,
            None => {
                return Err(PlanError::InsufficientData(
                    "capacity cannot be derived at zero state-of-charge".to_string(),
                ));
            }
        };
        if capacity <= KilowattHours::ZERO {
            return Err(PlanError::InsufficientData(format!("capacity {capacity} is invalid")));
        }
        let residual_energy = if telemetry.residual_energy > capacity {
            warn!(?telemetry.residual_energy, ?capacity, "residual energy exceeds the capacity");
            capacity
        } else {
            telemetry.residual_energy
        };

        let rating = rating.unwrap_or_else(|| {
            warn!(?DEFAULT_RATING, "unknown device rating, falling back to the defaults");
            DEFAULT_RATING
        });

        let nominal_voltage = ocv_at(config, config.nominal_soc);
        let voltage = if telemetry.voltage > Volts::ZERO {
            telemetry.voltage
        } else {
            warn!(?telemetry.voltage, "no battery voltage, assuming the nominal one");
            nominal_voltage
        };
        let internal_resistance = config.bat_resistance * (voltage / nominal_voltage);
        let open_circuit_voltage = (voltage + telemetry.current * internal_resistance)
            * (nominal_voltage / ocv_at(config, soc));

        let mut charge_current =
            config.charge_current.map_or(rating.max_charge_current, |current| {
                current.min(rating.max_charge_current)
            });
        let mut needs_full_charge = false;
        match derate(config, telemetry.temperature) {
            Derating::Unlimited => {}
            Derating::Limited(current) => {
                info!(?telemetry.temperature, ?current, "derating the charge current");
                charge_current = charge_current.min(current);
            }
            Derating::TooCold => {
                warn!(?telemetry.temperature, "too cold for a derated charge, forcing full charge");
                needs_full_charge = true;
            }
        }

        let charge_limit = (rating.power * config.grid_loss).min(Kilowatts::from(
            charge_current * (open_circuit_voltage + charge_current * internal_resistance),
        ));
        if charge_limit < MIN_CHARGE_POWER {
            return Err(PlanError::InvalidCurrent(charge_limit));
        }

        let discharge_current = config.discharge_current.unwrap_or(rating.max_charge_current);
        let discharge_limit =
            rating.power.min(Kilowatts::from(discharge_current * open_circuit_voltage));

        let charge_efficiency = config.charge_loss.unwrap_or_else(|| {
            // Resistive loss is I²R out of I×V:
            1.0 - (charge_current * internal_resistance) / open_circuit_voltage
        });

        let this = Self {
            state: BatteryState {
                state_of_charge: soc,
                residual_energy,
                capacity,
                voltage,
                current: telemetry.current,
                temperature: telemetry.temperature,
                internal_resistance,
                open_circuit_voltage,
            },
            limits: PowerLimits {
                charge_current,
                discharge_current,
                charge: charge_limit,
                discharge: discharge_limit,
            },
            charge_efficiency: charge_efficiency.clamp(0.5, 1.0),
            min_soc: min_soc.min_soc.min(config.min_soc.unwrap_or(min_soc.min_soc_on_grid)),
            min_soc_on_grid: config.min_soc.unwrap_or(min_soc.min_soc_on_grid),
            max_soc: config.max_soc,
            needs_full_charge,
        };
        info!(
            ?this.state.capacity,
            ?this.state.residual_energy,
            ?this.state.open_circuit_voltage,
            ?this.state.internal_resistance,
            ?this.limits.charge,
            ?this.limits.discharge,
            "estimated",
        );
        Ok(this)
    }

    /// Residual energy the inverter does not discharge below while on-grid.
    pub fn reserve(&self) -> KilowattHours {
        self.state.capacity * self.min_soc_on_grid
    }

    /// Residual energy at which the inverter tops the battery up from the grid.
    pub fn floor(&self) -> KilowattHours {
        self.state.capacity * self.min_soc
    }

    /// Highest residual energy the plan may charge to.
    pub fn ceiling(&self) -> KilowattHours {
        self.state.capacity * self.max_soc
    }

    pub fn state_of_charge(&self, residual_energy: KilowattHours) -> Percent {
        Percent(100.0 * (residual_energy / self.state.capacity))
    }
}

/// Piecewise-linear lookup by fractional index, clamped to the table bounds.
#[must_use]
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn interpolate(index: f64, table: &[f64]) -> f64 {
    let (Some(first), Some(last)) = (table.first(), table.last()) else {
        return 0.0;
    };
    if index <= 0.0 || index.is_nan() {
        return *first;
    }
    if index >= (table.len() - 1) as f64 {
        return *last;
    }
    let lower = index.floor() as usize;
    let fraction = index - lower as f64;
    table[lower] * (1.0 - fraction) + table[lower + 1] * fraction
}

/// Open-circuit voltage curve value at the state-of-charge.
fn ocv_at(config: &ChargeConfig, state_of_charge: Percent) -> Volts {
    let curve = config.volt_curve.map(|volts| volts.0);
    Volts(interpolate(state_of_charge.0 / 10.0, &curve))
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Derating {
    Unlimited,
    Limited(Amperes),
    TooCold,
}

/// Look up the charge current limit for the battery temperature.
#[must_use]
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn derate(config: &ChargeConfig, temperature: Celsius) -> Derating {
    if temperature > config.derate_temp {
        return Derating::Unlimited;
    }
    let step = ((config.derate_temp - temperature) / config.derate_step).floor() as usize;
    config.derating.get(step).map_or(Derating::TooCold, |current| Derating::Limited(*current))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const MIN_SOC: MinSoc = MinSoc { min_soc: Percent(10.0), min_soc_on_grid: Percent(20.0) };
    const RATING: DeviceRating =
        DeviceRating { power: Kilowatts(3.7), max_charge_current: Amperes(50.0) };

    fn telemetry(soc: f64, residual: f64) -> BatteryTelemetry {
        BatteryTelemetry {
            state_of_charge: Percent(soc),
            residual_energy: KilowattHours(residual),
            voltage: Volts(52.65),
            current: Amperes(0.0),
            temperature: Celsius(25.0),
        }
    }

    #[test]
    fn test_interpolate() {
        let table = [1.0, 2.0, 4.0];
        assert_abs_diff_eq!(interpolate(-1.0, &table), 1.0);
        assert_abs_diff_eq!(interpolate(0.5, &table), 1.5);
        assert_abs_diff_eq!(interpolate(1.25, &table), 2.5);
        assert_abs_diff_eq!(interpolate(2.0, &table), 4.0);
        assert_abs_diff_eq!(interpolate(10.0, &table), 4.0);
    }

    #[test]
    fn test_capacity_from_state_of_charge() {
        let model =
            BatteryModel::try_new(&telemetry(40.0, 4.0), MIN_SOC, Some(RATING), &ChargeConfig::default())
                .unwrap();
        assert_abs_diff_eq!(model.state.capacity.0, 10.0);
        assert_abs_diff_eq!(model.reserve().0, 2.0);
        assert_abs_diff_eq!(model.floor().0, 1.0);
    }

    #[test]
    fn test_capacity_override() {
        let config = ChargeConfig { capacity: Some(KilowattHours(12.0)), ..ChargeConfig::default() };
        let model = BatteryModel::try_new(&telemetry(0.0, 0.0), MIN_SOC, Some(RATING), &config)
            .unwrap();
        assert_abs_diff_eq!(model.state.capacity.0, 12.0);
    }

    #[test]
    fn test_zero_state_of_charge_without_override() {
        let result =
            BatteryModel::try_new(&telemetry(0.0, 0.0), MIN_SOC, Some(RATING), &ChargeConfig::default());
        assert!(matches!(result, Err(PlanError::InsufficientData(_))));
    }

    #[test]
    fn test_min_soc_override() {
        let config = ChargeConfig { min_soc: Some(Percent(30.0)), ..ChargeConfig::default() };
        let model =
            BatteryModel::try_new(&telemetry(40.0, 4.0), MIN_SOC, Some(RATING), &config).unwrap();
        assert_abs_diff_eq!(model.reserve().0, 3.0);
    }

    #[test]
    fn test_open_circuit_voltage() {
        let config = ChargeConfig::default();
        let model =
            BatteryModel::try_new(&telemetry(40.0, 4.0), MIN_SOC, Some(RATING), &config).unwrap();
        // Nominal 55% reads 52.65 V on the curve, 40% reads 52.50 V:
        assert_abs_diff_eq!(model.state.open_circuit_voltage.0, 52.65 * 52.65 / 52.5, epsilon = 1e-9);
        assert_abs_diff_eq!(model.state.internal_resistance.0, 0.072, epsilon = 1e-9);
    }

    #[test]
    fn test_charge_limit_is_capped_by_rated_power() {
        let rating = DeviceRating { max_charge_current: Amperes(100.0), ..RATING };
        let model =
            BatteryModel::try_new(&telemetry(40.0, 4.0), MIN_SOC, Some(rating), &ChargeConfig::default())
                .unwrap();
        assert_abs_diff_eq!(model.limits.charge.0, 3.7 * 0.976, epsilon = 1e-9);
        assert!(model.limits.discharge <= RATING.power);
        assert!(model.charge_efficiency < 1.0);
    }

    #[test]
    fn test_missing_rating_falls_back() {
        let model =
            BatteryModel::try_new(&telemetry(40.0, 4.0), MIN_SOC, None, &ChargeConfig::default())
                .unwrap();
        assert!(model.limits.charge <= DEFAULT_RATING.power);
        assert_eq!(model.limits.charge_current, DEFAULT_RATING.max_charge_current);
    }

    #[test]
    fn test_derate() {
        let config = ChargeConfig::default();
        assert_eq!(derate(&config, Celsius(25.0)), Derating::Unlimited);
        assert_eq!(derate(&config, Celsius(21.0)), Derating::Limited(Amperes(24.0)));
        assert_eq!(derate(&config, Celsius(10.0)), Derating::Limited(Amperes(10.0)));
        assert_eq!(derate(&config, Celsius(-5.0)), Derating::TooCold);
    }

    #[test]
    fn test_derated_charge_limit() {
        let mut battery = telemetry(40.0, 4.0);
        battery.temperature = Celsius(10.0);
        let model =
            BatteryModel::try_new(&battery, MIN_SOC, Some(RATING), &ChargeConfig::default()).unwrap();
        assert_eq!(model.limits.charge_current, Amperes(10.0));
        assert!(model.limits.charge < Kilowatts(0.6));
        assert!(!model.needs_full_charge);
    }

    #[test]
    fn test_too_cold_forces_full_charge() {
        let mut battery = telemetry(40.0, 4.0);
        battery.temperature = Celsius(-5.0);
        let model =
            BatteryModel::try_new(&battery, MIN_SOC, Some(RATING), &ChargeConfig::default()).unwrap();
        assert!(model.needs_full_charge);
    }

    #[test]
    fn test_invalid_current() {
        let config = ChargeConfig {
            derating: vec![Amperes(24.0), Amperes(15.0), Amperes(10.0), Amperes(0.5)],
            ..ChargeConfig::default()
        };
        let mut battery = telemetry(40.0, 4.0);
        battery.temperature = Celsius(5.0);
        let result = BatteryModel::try_new(&battery, MIN_SOC, Some(RATING), &config);
        assert!(matches!(result, Err(PlanError::InvalidCurrent(_))));
    }
}
