//! Hourly household consumption expected over the planning horizon.

use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    api::models::DailyEnergy,
    config::{ChargeConfig, ConsumptionSpan},
    error::PlanError,
    prelude::*,
    quantity::energy::KilowattHours,
};

/// Static diurnal consumption shape, used when there is no usable history.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileShape {
    /// Pronounced morning and evening peaks.
    High,

    #[default]
    Medium,

    Flat,
}

impl ProfileShape {
    #[must_use]
    pub const fn weights(self) -> [f64; 24] {
        match self {
            Self::High => [
                0.6, 0.4, 0.4, 0.4, 0.4, 0.6, 1.2, 1.8, 1.4, 0.9, 0.8, 0.8, //
                0.9, 0.8, 0.8, 0.9, 1.2, 2.0, 2.4, 2.2, 1.8, 1.4, 1.0, 0.8,
            ],
            Self::Medium => [
                0.7, 0.6, 0.6, 0.6, 0.6, 0.7, 1.0, 1.3, 1.2, 1.0, 0.9, 0.9, //
                1.0, 0.9, 0.9, 1.0, 1.1, 1.5, 1.7, 1.6, 1.4, 1.2, 1.0, 0.8,
            ],
            Self::Flat => [1.0; 24],
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DemandSource {
    Manual,
    Annual,
    History,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DemandProfile {
    pub source: DemandSource,

    /// Expected consumption over the whole day.
    pub daily: KilowattHours,

    /// Expected consumption per hour of day, sums up to [`DemandProfile::daily`].
    pub hourly: [KilowattHours; 24],
}

impl DemandProfile {
    /// Build the profile for the day the charge window ends on.
    #[instrument(skip_all, fields(target_date = %target_date))]
    pub fn try_new(
        config: &ChargeConfig,
        history: &[DailyEnergy],
        target_date: NaiveDate,
    ) -> Result<Self, PlanError> {
        let days =
            select_history(history, config.consumption_span, config.consumption_days, target_date);
        let history_shape = average_shape(&days);

        let this = if let Some(daily) = config.consumption {
            let weights = history_shape.unwrap_or_else(|| config.consumption_profile.weights());
            Self { source: DemandSource::Manual, daily, hourly: rescale(&weights, daily) }
        } else if let Some(annual) = config.annual_consumption {
            let month = target_date.month0() as usize;
            let total_weight = config.seasonality.iter().sum::<f64>();
            let daily = annual / 365.0 * (config.seasonality[month] / total_weight * 12.0);
            Self {
                source: DemandSource::Annual,
                daily,
                hourly: rescale(&config.consumption_profile.weights(), daily),
            }
        } else if let Some(weights) = history_shape {
            #[expect(clippy::cast_precision_loss)]
            let daily = days.iter().map(|day| day.total).sum::<KilowattHours>() / days.len() as f64;
            Self { source: DemandSource::History, daily, hourly: rescale(&weights, daily) }
        } else {
            return Err(PlanError::NoConsumptionData);
        };

        info!(source = ?this.source, daily = ?this.daily, n_history_days = days.len(), "built");
        Ok(this)
    }
}

/// Most recent valid days: consecutive ones, or those on the same weekday as the target date.
fn select_history(
    history: &[DailyEnergy],
    span: ConsumptionSpan,
    n_days: usize,
    target_date: NaiveDate,
) -> Vec<&DailyEnergy> {
    history
        .iter()
        .filter(|day| day.date < target_date && day.is_valid())
        .filter(|day| match span {
            ConsumptionSpan::Days => true,
            ConsumptionSpan::Weeks => day.date.weekday() == target_date.weekday(),
        })
        .sorted_by_key(|day| std::cmp::Reverse(day.date))
        .dedup_by(|lhs, rhs| lhs.date == rhs.date)
        .take(n_days)
        .collect()
}

/// Hour-of-day average over the days.
fn average_shape(days: &[&DailyEnergy]) -> Option<[f64; 24]> {
    if days.is_empty() {
        return None;
    }
    let mut shape = [0.0; 24];
    for day in days {
        for (total, energy) in shape.iter_mut().zip(day.hourly) {
            *total += energy.0;
        }
    }
    Some(shape)
}

/// Scale the weights so that they sum up to the total.
///
/// Degenerate weights fall back to a flat profile.
#[must_use]
pub fn rescale(weights: &[f64; 24], total: KilowattHours) -> [KilowattHours; 24] {
    let sum = weights.iter().sum::<f64>();
    if sum > 0.0 && sum.is_finite() {
        weights.map(|weight| total * (weight / sum))
    } else {
        [total / 24.0; 24]
    }
}

/// Rotate the hour-of-day profile so that the index zero is the starting hour,
/// and repeat it to cover the run.
#[must_use]
pub fn timed<T: Copy>(profile: &[T; 24], start_hour: u32, n_hours: usize) -> Vec<T> {
    (0..n_hours).map(|i| profile[(start_hour as usize + i) % 24]).collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn day(date: NaiveDate, total: f64, evening: f64) -> DailyEnergy {
        let mut energy = DailyEnergy::flat(date, KilowattHours(total - evening));
        energy.hourly[19] += KilowattHours(evening);
        energy.total = KilowattHours(total);
        energy
    }

    #[test]
    fn test_history_average() {
        let history = [day(date(11, 13), 6.0, 1.0), day(date(11, 14), 10.0, 1.0), day(date(11, 15), 8.0, 1.0)];
        let profile =
            DemandProfile::try_new(&ChargeConfig::default(), &history, date(11, 16)).unwrap();
        assert_eq!(profile.source, DemandSource::History);
        assert_abs_diff_eq!(profile.daily.0, 8.0, epsilon = 1e-9);
        assert_abs_diff_eq!(profile.hourly.iter().copied().sum::<KilowattHours>().0, 8.0, epsilon = 1e-9);
        assert!(profile.hourly[19] > profile.hourly[3]);
    }

    #[test]
    fn test_history_depth() {
        let history = [day(date(11, 12), 20.0, 1.0), day(date(11, 14), 6.0, 1.0), day(date(11, 15), 8.0, 1.0)];
        let config = ChargeConfig { consumption_days: 2, ..ChargeConfig::default() };
        let profile = DemandProfile::try_new(&config, &history, date(11, 16)).unwrap();
        assert_abs_diff_eq!(profile.daily.0, 7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_same_weekday_span() {
        // 2025-11-16 is a Sunday.
        let history = [day(date(11, 2), 12.0, 1.0), day(date(11, 9), 10.0, 1.0), day(date(11, 15), 5.0, 1.0)];
        let config =
            ChargeConfig { consumption_span: ConsumptionSpan::Weeks, ..ChargeConfig::default() };
        let profile = DemandProfile::try_new(&config, &history, date(11, 16)).unwrap();
        assert_abs_diff_eq!(profile.daily.0, 11.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_days_are_skipped() {
        let history = [DailyEnergy::flat(date(11, 15), KilowattHours::ZERO)];
        let result = DemandProfile::try_new(&ChargeConfig::default(), &history, date(11, 16));
        assert!(matches!(result, Err(PlanError::NoConsumptionData)));
    }

    #[test]
    fn test_annual_estimate() {
        let config = ChargeConfig {
            annual_consumption: Some(KilowattHours(3650.0)),
            consumption_profile: ProfileShape::Flat,
            ..ChargeConfig::default()
        };
        let profile = DemandProfile::try_new(&config, &[], date(12, 10)).unwrap();
        assert_eq!(profile.source, DemandSource::Annual);
        // December weighs 1.2 out of 12.1 in total:
        let expected = 10.0 * 1.2 / 12.1 * 12.0;
        assert_abs_diff_eq!(profile.daily.0, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(profile.hourly[0].0, expected / 24.0, epsilon = 1e-9);
    }

    #[test]
    fn test_manual_consumption_uses_history_shape() {
        let history = [day(date(11, 15), 8.0, 2.0)];
        let config = ChargeConfig { consumption: Some(KilowattHours(16.0)), ..ChargeConfig::default() };
        let profile = DemandProfile::try_new(&config, &history, date(11, 16)).unwrap();
        assert_eq!(profile.source, DemandSource::Manual);
        assert_abs_diff_eq!(profile.daily.0, 16.0);
        assert_abs_diff_eq!(profile.hourly[19].0, 2.0 * (2.0 + 6.0 / 24.0), epsilon = 1e-9);
    }

    #[test]
    fn test_timed() {
        let profile: [u32; 24] = std::array::from_fn(|hour| u32::try_from(hour).unwrap());
        assert_eq!(timed(&profile, 22, 4), vec![22, 23, 0, 1]);
        assert_eq!(timed(&profile, 5, 30).len(), 30);
        assert_eq!(timed(&profile, 5, 30)[29], 10);
    }

    #[test]
    fn test_rescale_degenerate() {
        assert_abs_diff_eq!(rescale(&[0.0; 24], KilowattHours(2.4))[7].0, 0.1, epsilon = 1e-12);
    }
}
