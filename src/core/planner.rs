//! Charge-needed calculation: baseline projection, need assessment, duration and the
//! charge-augmented projection.

use bon::Builder;
use chrono::{NaiveDateTime, TimeDelta};

use crate::{
    config::{ChargeConfig, ForcePolicy},
    core::{
        battery::BatteryModel,
        clock::{ClockTime, DaylightSaving},
        demand::DemandProfile,
        generation::GenerationProfile,
        inputs::PlanInputs,
        plan::{Decision, Plan},
        simulator::{self, ChargePeriod},
        timeline::Timeline,
        window::{self, SelectedWindow},
    },
    error::PlanError,
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts, proportions::Percent, time::Hours},
};

/// The charging rate halves above this state-of-charge.
const TAPER_SOC: Percent = Percent(95.0);

/// A charge overshooting the ceiling by more than this becomes a full charge.
const OVERSHOOT_RATIO: f64 = 1.05;

/// Charge-augmented passes to converge on the duration.
const MAX_PASSES: usize = 4;

/// Remaining deficit not worth another pass.
const DEFICIT_TOLERANCE: KilowattHours = KilowattHours(0.01);

/// Plan the grid charge for the next charge window.
///
/// Pure given the inputs: the same inputs and `now` always produce the same plan.
pub fn plan_charge(
    inputs: &PlanInputs,
    config: &ChargeConfig,
    now: NaiveDateTime,
) -> Result<Plan, PlanError> {
    Planner::builder().inputs(inputs).config(config).now(now).plan()
}

#[derive(Builder)]
#[builder(finish_fn(vis = ""))]
pub struct Planner<'a> {
    inputs: &'a PlanInputs,
    config: &'a ChargeConfig,
    now: NaiveDateTime,
}

impl<S: planner_builder::IsComplete> PlannerBuilder<'_, S> {
    pub fn plan(self) -> Result<Plan, PlanError> {
        self.build().plan()
    }
}

impl Planner<'_> {
    #[instrument(skip_all, name = "Planning…", fields(now = %self.now))]
    fn plan(self) -> Result<Plan, PlanError> {
        self.config.validate()?;
        let battery = BatteryModel::try_new(
            &self.inputs.telemetry,
            self.inputs.min_soc,
            self.inputs.rating,
            self.config,
        )?;
        let window = window::select(&self.config.windows, self.now)?;
        let target_date = window.ends_at.date();
        let demand =
            DemandProfile::try_new(self.config, &self.inputs.consumption_history, target_date)?;
        let generation = GenerationProfile::try_new(
            self.config,
            &self.inputs.forecasts,
            &self.inputs.generation_history,
            target_date,
        )?;
        let daylight_saving: Box<dyn DaylightSaving> = self.config.daylight_saving.into();

        let timeline = Timeline::builder()
            .now(self.now)
            .n_hours(window.end_index() + 24)
            .window(&window)
            .battery(&battery)
            .demand(&demand)
            .generation(&generation)
            .config(self.config)
            .daylight_saving(daylight_saving.as_ref())
            .build();
        let baseline = simulator::baseline(&timeline, &battery);

        let required = battery.reserve() + demand.daily * self.config.contingency_on(target_date);
        let (min_index, min_balance) = baseline.min_balance_since(window.end_index());
        let start_residual = baseline.residual_at(window.start);
        let target = self.config.target_soc.map(|target_soc| battery.state.capacity * target_soc);
        let shortfall = match target {
            Some(target) => target - baseline.residual_at(window.end),
            None => required - min_balance,
        };
        let full_charge_triggered = battery.needs_full_charge
            || self
                .config
                .full_charge
                .is_some_and(|trigger| trigger.is_active_on(window.starts_at.date()));
        info!(
            ?required,
            ?min_balance,
            ?shortfall,
            full_charge_triggered,
            forecast = ?generation.source,
            "assessed",
        );

        let holds = window.window.forced || self.config.force == ForcePolicy::Hold;
        let mut plan = Plan {
            decision: Decision::NoChargeNeeded,
            charge_needed: KilowattHours::ZERO,
            charge_added: KilowattHours::ZERO,
            duration: Hours::ZERO,
            charge: None,
            hold: holds.then_some(window.starts_at..window.ends_at),
            start_time: ClockTime::of(window.starts_at),
            end_time: ClockTime::of(window.starts_at),
            projected_min_residual: min_balance,
            projected_min_hour: timeline.clock_hour_at(min_index),
            forecast_source: generation.source,
            demand_source: demand.source,
            start_soc: battery.state_of_charge(start_residual),
            end_soc: battery.state_of_charge(start_residual),
            window,
            update_allowed: window.update_allowed,
            timeline,
            baseline,
            augmented: None,
        };
        if shortfall < self.config.min_kwh && !full_charge_triggered {
            info!("no charge needed");
            return Ok(plan);
        }

        let rate = battery.limits.charge * battery.charge_efficiency
            + plan.timeline.discharge_rate_at(window.start);
        let (decision, mut duration) =
            self.duration(&battery, &window, shortfall, start_residual, rate, full_charge_triggered);

        // Extend the charge while the augmented projection still falls short:
        let mut n_passes = 0;
        let augmented = loop {
            let charge = ChargePeriod {
                period: window.start..(window.start + duration.0),
                power: battery.limits.charge,
            };
            let augmented = simulator::with_charge(&plan.timeline, &battery, &charge);
            n_passes += 1;
            let deficit = match target {
                Some(target) => target - augmented.residual_at(window.end),
                None => required - augmented.min_balance_since(window.end_index()).1,
            };
            debug!(n_passes, ?duration, ?deficit, "simulated");
            if deficit <= DEFICIT_TOLERANCE
                || duration >= window.length()
                || n_passes >= MAX_PASSES
            {
                break augmented;
            }
            duration = (duration + deficit / rate).round_to_minute().min(window.length());
        };

        let charge_ends_at = window.starts_at + TimeDelta::from(duration);
        plan.decision = decision;
        plan.charge_needed = shortfall.max(KilowattHours::ZERO);
        plan.charge_added =
            augmented.residual_at(window.end) - plan.baseline.residual_at(window.end);
        plan.duration = duration;
        plan.charge = Some(window.starts_at..charge_ends_at);
        plan.hold =
            (holds && charge_ends_at < window.ends_at).then_some(charge_ends_at..window.ends_at);
        plan.end_time = ClockTime::of(charge_ends_at);
        plan.end_soc = battery.state_of_charge(augmented.residual_at(window.end));
        plan.augmented = Some(augmented);
        info!(
            decision = ?plan.decision,
            start = %plan.start_time,
            end = %plan.end_time,
            charge_needed = ?plan.charge_needed,
            charge_added = ?plan.charge_added,
            n_passes,
            "planned",
        );
        Ok(plan)
    }

    /// Charge duration before the augmented passes, floored and capped by the window.
    fn duration(
        &self,
        battery: &BatteryModel,
        window: &SelectedWindow,
        shortfall: KilowattHours,
        start_residual: KilowattHours,
        rate: Kilowatts,
        full_charge_triggered: bool,
    ) -> (Decision, Hours) {
        let window_length = window.length();
        let duration = time_to_add(battery, start_residual, shortfall, rate);
        let overshoots = start_residual + shortfall > battery.ceiling() * OVERSHOOT_RATIO;

        let (decision, duration) = if full_charge_triggered {
            (Decision::FullCharge, window_length)
        } else if duration > window_length || overshoots {
            let shortfall = (battery.ceiling() - start_residual).max(KilowattHours::ZERO);
            (Decision::FullCharge, time_to_add(battery, start_residual, shortfall, rate))
        } else {
            (Decision::Charge, duration)
        };

        let min_duration =
            window.window.min_duration.unwrap_or(self.config.min_hours).min(window_length);
        (decision, duration.max(min_duration).round_to_minute().min(window_length))
    }
}

/// Time to add the energy, with the taper above [`TAPER_SOC`] taking twice as long.
fn time_to_add(
    battery: &BatteryModel,
    start_residual: KilowattHours,
    energy: KilowattHours,
    rate: Kilowatts,
) -> Hours {
    let taper_from = battery.state.capacity * TAPER_SOC;
    let end_residual = start_residual + energy;
    let tapered = (end_residual - taper_from.max(start_residual)).max(KilowattHours::ZERO);
    (energy + tapered) / rate
}
