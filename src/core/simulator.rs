//! Hour-by-hour projection of the battery residual energy.
//!
//! The baseline and charge-augmented passes are separate functions sharing the same walk.

use std::ops::Range;

use serde::Serialize;

use crate::{
    core::{
        battery::BatteryModel,
        clock::overlap,
        timeline::{HourlyStep, Timeline},
    },
    quantity::{energy::KilowattHours, power::Kilowatts, time::Hours},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Simulation {
    /// Residual energy at each hour boundary, one more than there are steps.
    pub residual: Vec<KilowattHours>,

    /// Residual energy if the battery could go below the reserve, the ceiling still applies.
    pub balance: Vec<KilowattHours>,
}

impl Simulation {
    /// Residual energy at the axis position, interpolated within the hour.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn residual_at(&self, position: f64) -> KilowattHours {
        let last = self.residual.len().saturating_sub(1);
        let index = (position.max(0.0).floor() as usize).min(last);
        let fraction = (position - index as f64).clamp(0.0, 1.0);
        match (self.residual.get(index), self.residual.get(index + 1)) {
            (Some(lhs), Some(rhs)) => *lhs + (*rhs - *lhs) * fraction,
            (Some(residual), None) => *residual,
            _ => KilowattHours::ZERO,
        }
    }

    /// Lowest balance at or after the hour boundary, and its index.
    #[must_use]
    pub fn min_balance_since(&self, index: usize) -> (usize, KilowattHours) {
        let index = index.min(self.balance.len().saturating_sub(1));
        self.balance
            .iter()
            .copied()
            .enumerate()
            .skip(index)
            .min_by_key(|(_, balance)| *balance)
            .unwrap_or_default()
    }

    #[cfg(test)]
    #[must_use]
    pub fn max_residual(&self) -> KilowattHours {
        self.residual.iter().copied().max().unwrap_or_default()
    }
}

/// Grid charging over a part of the simulation axis.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChargePeriod {
    pub period: Range<f64>,
    pub power: Kilowatts,
}

/// Residual energy at the start of the current hour, given that the part of the hour has passed.
#[must_use]
pub fn initial_residual(timeline: &Timeline, battery: &BatteryModel) -> KilowattHours {
    let residual = battery.state.residual_energy;
    timeline.steps.first().map_or(residual, |step| {
        let delta = step.charge * battery.charge_efficiency - step.discharge;
        (residual - delta * timeline.elapsed.0).clamp(KilowattHours::ZERO, battery.state.capacity)
    })
}

/// Walk without any grid charging.
#[must_use]
pub fn baseline(timeline: &Timeline, battery: &BatteryModel) -> Simulation {
    walk(timeline, battery, |_, step| (step.charge, step.discharge))
}

/// Walk with the grid charging over the period.
///
/// The charger power is apportioned to each hour by the overlap, and the load is assumed to be
/// served from the charger over the same part of the hour.
#[must_use]
pub fn with_charge(timeline: &Timeline, battery: &BatteryModel, charge: &ChargePeriod) -> Simulation {
    let charge_limit = battery.limits.charge * Hours::ONE;
    walk(timeline, battery, |i, step| {
        #[expect(clippy::cast_precision_loss)]
        let fraction = overlap(i as f64..(i + 1) as f64, charge.period.clone());
        (
            (step.charge + charge.power * Hours(fraction)).min(charge_limit.max(step.charge)),
            step.discharge * (1.0 - fraction),
        )
    })
}

fn walk(
    timeline: &Timeline,
    battery: &BatteryModel,
    flows: impl Fn(usize, &HourlyStep) -> (KilowattHours, KilowattHours),
) -> Simulation {
    let reserve = battery.reserve();
    let floor = battery.floor();
    let ceiling = battery.ceiling();

    let mut residual = initial_residual(timeline, battery);
    let mut balance = residual;

    // Energy left while the inverter refuses to discharge below the reserve:
    let mut buffer: Option<KilowattHours> = None;

    let mut residuals = Vec::with_capacity(timeline.steps.len() + 1);
    let mut balances = Vec::with_capacity(timeline.steps.len() + 1);
    residuals.push(residual);
    balances.push(balance);

    for (i, step) in timeline.steps.iter().enumerate() {
        let (charge, discharge) = flows(i, step);
        let delta = charge * battery.charge_efficiency - discharge;
        let next = residual + delta;

        if delta < KilowattHours::ZERO && next <= reserve {
            // The BMS keeps drawing the standby power from the held battery,
            // and the inverter tops it up back to the reserve once it goes below the floor:
            let drained = buffer.unwrap_or_else(|| residual.min(reserve)) - timeline.standby;
            residual = if drained < floor { reserve } else { drained };
            buffer = Some(residual);
        } else {
            buffer = None;
            residual = next.min(ceiling.max(residual));
        }
        balance = (balance + delta).min(ceiling.max(balance));

        residuals.push(residual);
        balances.push(balance);
    }

    Simulation { residual: residuals, balance: balances }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        core::{
            battery::{BatteryState, PowerLimits},
            working_mode::WorkMode,
        },
        quantity::{
            electric::{Amperes, Ohms, Volts},
            proportions::Percent,
            temperature::Celsius,
        },
    };

    fn battery(residual_energy: f64) -> BatteryModel {
        BatteryModel {
            state: BatteryState {
                state_of_charge: Percent(residual_energy * 10.0),
                residual_energy: KilowattHours(residual_energy),
                capacity: KilowattHours(10.0),
                voltage: Volts(52.5),
                current: Amperes(0.0),
                temperature: Celsius(25.0),
                internal_resistance: Ohms(0.072),
                open_circuit_voltage: Volts(52.5),
            },
            limits: PowerLimits {
                charge_current: Amperes(50.0),
                discharge_current: Amperes(50.0),
                charge: Kilowatts(2.5),
                discharge: Kilowatts(2.5),
            },
            charge_efficiency: 1.0,
            min_soc: Percent(10.0),
            min_soc_on_grid: Percent(20.0),
            max_soc: Percent::HUNDRED,
            needs_full_charge: false,
        }
    }

    fn timeline(elapsed: f64, standby: f64, flows: &[(f64, f64)]) -> Timeline {
        Timeline {
            starts_at: NaiveDate::from_ymd_opt(2025, 11, 16).unwrap().and_hms_opt(2, 0, 0).unwrap(),
            elapsed: Hours(elapsed),
            standby: KilowattHours(standby),
            steps: flows
                .iter()
                .map(|(charge, discharge)| HourlyStep {
                    clock_hour: 0,
                    generation: KilowattHours(*charge),
                    consumption: KilowattHours(*discharge),
                    charge: KilowattHours(*charge),
                    discharge: KilowattHours(*discharge),
                    work_mode: WorkMode::SelfUse,
                    held: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_conservation_without_clamping() {
        let timeline = timeline(0.0, 0.0, &[(0.0, 0.5), (1.0, 0.2), (0.0, 0.3)]);
        let simulation = baseline(&timeline, &battery(4.0));
        for (i, step) in timeline.steps.iter().enumerate() {
            let delta = simulation.residual[i + 1] - simulation.residual[i];
            assert_abs_diff_eq!(delta.0, (step.charge - step.discharge).0, epsilon = 1e-9);
        }
        assert_eq!(simulation.residual, simulation.balance);
    }

    #[test]
    fn test_initial_residual_is_back_computed() {
        let timeline = timeline(0.5, 0.0, &[(0.0, 1.0)]);
        assert_abs_diff_eq!(initial_residual(&timeline, &battery(4.0)).0, 4.5);
    }

    #[test]
    fn test_reserve_buffer() {
        let timeline = timeline(0.0, 0.3, &[(0.0, 1.0); 5]);
        let simulation = baseline(&timeline, &battery(4.0));
        let expected = [4.0, 3.0, 1.7, 1.4, 1.1, 2.0];
        for (actual, expected) in simulation.residual.iter().zip(expected) {
            assert_abs_diff_eq!(actual.0, expected, epsilon = 1e-9);
        }
        let (index, balance) = simulation.min_balance_since(2);
        assert_eq!(index, 5);
        assert_abs_diff_eq!(balance.0, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ceiling() {
        let timeline = timeline(0.0, 0.0, &[(2.0, 0.0); 3]);
        let simulation = baseline(&timeline, &battery(8.0));
        assert_eq!(simulation.residual.last(), Some(&KilowattHours(10.0)));
        assert_eq!(simulation.balance.last(), Some(&KilowattHours(10.0)));
    }

    #[test]
    fn test_with_charge_apportions_partial_hours() {
        let timeline = timeline(0.0, 0.0, &[(0.0, 0.5); 4]);
        let battery = battery(4.0);
        let charge = ChargePeriod { period: 1.5..3.0, power: Kilowatts(2.0) };
        let augmented = with_charge(&timeline, &battery, &charge);
        let expected = [4.0, 3.5, 4.25, 6.25, 5.75];
        for (actual, expected) in augmented.residual.iter().zip(expected) {
            assert_abs_diff_eq!(actual.0, expected, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(augmented.residual_at(1.5).0, 3.875, epsilon = 1e-9);

        let baseline = baseline(&timeline, &battery);
        assert_abs_diff_eq!(baseline.residual_at(3.0).0, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_with_charge_capacity_bound() {
        let timeline = timeline(0.0, 0.0, &[(0.5, 0.1); 6]);
        let charge = ChargePeriod { period: 0.0..6.0, power: Kilowatts(2.5) };
        let augmented = with_charge(&timeline, &battery(9.0), &charge);
        assert!(augmented.max_residual() <= KilowattHours(10.0));
        assert_eq!(augmented.residual.last(), Some(&KilowattHours(10.0)));
    }
}
