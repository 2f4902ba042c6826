//! Hourly PV generation expected over the planning horizon.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    api::models::DailyEnergy,
    config::ChargeConfig,
    core::{demand::rescale, inputs::Forecasts},
    error::PlanError,
    prelude::*,
    quantity::{energy::KilowattHours, proportions::Percent},
};

/// Solar forecast services the planner can consult.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ForecastService {
    #[default]
    Solcast,

    /// Forecast.Solar.
    Solar,
}

impl ForecastService {
    /// This service first, then the others.
    #[must_use]
    pub const fn with_fallback(self) -> [Self; 2] {
        match self {
            Self::Solcast => [Self::Solcast, Self::Solar],
            Self::Solar => [Self::Solar, Self::Solcast],
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastSource {
    Manual,
    Solcast,
    Solar,
    Historical,
}

impl From<ForecastService> for ForecastSource {
    fn from(service: ForecastService) -> Self {
        match service {
            ForecastService::Solcast => Self::Solcast,
            ForecastService::Solar => Self::Solar,
        }
    }
}

/// Relative hourly PV output by calendar quarter, January–March first.
const SUN_CURVES: [[f64; 24]; 4] = [
    [
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1, 0.4, 0.8, 1.1, //
        1.2, 1.1, 0.8, 0.4, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    ],
    [
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1, 0.3, 0.6, 0.9, 1.1, 1.2, //
        1.3, 1.2, 1.1, 0.9, 0.6, 0.3, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0,
    ],
    [
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1, 0.3, 0.6, 0.9, 1.1, 1.2, //
        1.3, 1.2, 1.1, 0.9, 0.6, 0.3, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0,
    ],
    [
        0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.2, 0.5, 0.9, 1.1, //
        1.1, 1.0, 0.7, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    ],
];

/// Sun curve for the quarter of the date.
#[must_use]
pub fn sun_curve(date: NaiveDate) -> &'static [f64; 24] {
    &SUN_CURVES[date.month0() as usize / 3]
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationProfile {
    pub source: ForecastSource,

    /// Expected generation on the target date.
    pub expected: KilowattHours,

    /// Hourly generation per date, sorted by the date.
    days: Vec<DailyEnergy>,
}

impl GenerationProfile {
    /// Pick the first available source: manual override, forecast services, generation history.
    #[instrument(skip_all, fields(target_date = %target_date))]
    pub fn try_new(
        config: &ChargeConfig,
        forecasts: &Forecasts,
        history: &[DailyEnergy],
        target_date: NaiveDate,
    ) -> Result<Self, PlanError> {
        let this = if let Some(total) = forecasts.manual {
            Self::shaped(ForecastSource::Manual, total, target_date)
        } else if let Some(this) = config
            .preferred_forecast
            .with_fallback()
            .into_iter()
            .find_map(|service| Self::from_service(service, forecasts.get(service), target_date))
        {
            this
        } else if let Some(total) = average_total(history, config.generation_days, target_date) {
            Self::shaped(ForecastSource::Historical, total, target_date)
        } else {
            return Err(PlanError::NoForecast);
        };

        let adjustment = config.forecast_adjust.get(this.source);
        let this = this.adjusted(adjustment);
        info!(source = ?this.source, expected = ?this.expected, "built");
        Ok(this)
    }

    fn shaped(source: ForecastSource, total: KilowattHours, date: NaiveDate) -> Self {
        let hourly = rescale(sun_curve(date), total);
        Self { source, expected: total, days: vec![DailyEnergy { date, hourly, total }] }
    }

    /// Service forecast, if it covers the target date.
    fn from_service(
        service: ForecastService,
        forecasts: &[DailyEnergy],
        target_date: NaiveDate,
    ) -> Option<Self> {
        let days = forecasts
            .iter()
            .filter(|day| {
                day.total.is_finite()
                    && day
                        .hourly
                        .iter()
                        .all(|energy| energy.is_finite() && *energy >= KilowattHours::ZERO)
            })
            .sorted_by_key(|day| day.date)
            .cloned()
            .collect_vec();
        let Some(target) = days.iter().find(|day| day.date == target_date) else {
            debug!(?service, "the forecast does not cover the target date");
            return None;
        };
        Some(Self { source: service.into(), expected: target.total, days })
    }

    fn adjusted(mut self, adjustment: Percent) -> Self {
        let ratio = adjustment.to_ratio();
        self.expected = self.expected * ratio;
        for day in &mut self.days {
            day.hourly = day.hourly.map(|energy| energy * ratio);
            day.total = day.total * ratio;
        }
        self
    }

    /// Generation over the hour starting at the timestamp.
    ///
    /// Dates that are not covered reuse the latest covered day before them, or the earliest one.
    #[must_use]
    pub fn at(&self, timestamp: NaiveDateTime) -> KilowattHours {
        let date = timestamp.date();
        let day = self
            .days
            .iter()
            .rev()
            .find(|day| day.date <= date)
            .or_else(|| self.days.first());
        day.map_or(KilowattHours::ZERO, |day| day.hourly[timestamp.hour() as usize])
    }
}

/// Average daily PV generation over the most recent valid days.
#[expect(clippy::cast_precision_loss)]
fn average_total(
    history: &[DailyEnergy],
    n_days: usize,
    target_date: NaiveDate,
) -> Option<KilowattHours> {
    let totals = history
        .iter()
        .filter(|day| day.date < target_date && day.is_valid())
        .sorted_by_key(|day| std::cmp::Reverse(day.date))
        .dedup_by(|lhs, rhs| lhs.date == rhs.date)
        .take(n_days)
        .map(|day| day.total)
        .collect_vec();
    (!totals.is_empty()).then(|| totals.iter().copied().sum::<KilowattHours>() / totals.len() as f64)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveTime;

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
    }

    fn forecast(date: NaiveDate, noon: f64) -> DailyEnergy {
        let mut hourly = [KilowattHours::ZERO; 24];
        hourly[12] = KilowattHours(noon);
        DailyEnergy { date, hourly, total: KilowattHours(noon) }
    }

    #[test]
    fn test_manual_override_wins() {
        let forecasts = Forecasts {
            manual: Some(KilowattHours(2.0)),
            solcast: vec![forecast(date(16), 5.0)],
            ..Forecasts::default()
        };
        let profile =
            GenerationProfile::try_new(&ChargeConfig::default(), &forecasts, &[], date(16)).unwrap();
        assert_eq!(profile.source, ForecastSource::Manual);
        assert_abs_diff_eq!(profile.expected.0, 2.0);
        let total: KilowattHours = (0..24)
            .map(|hour| profile.at(date(17).and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())))
            .sum();
        assert_abs_diff_eq!(total.0, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_preferred_service_first() {
        let forecasts = Forecasts {
            solcast: vec![forecast(date(16), 5.0)],
            solar: vec![forecast(date(16), 3.0)],
            ..Forecasts::default()
        };
        let config =
            ChargeConfig { preferred_forecast: ForecastService::Solar, ..ChargeConfig::default() };
        let profile = GenerationProfile::try_new(&config, &forecasts, &[], date(16)).unwrap();
        assert_eq!(profile.source, ForecastSource::Solar);
        assert_abs_diff_eq!(profile.expected.0, 3.0);
    }

    #[test]
    fn test_service_not_covering_target_date_is_skipped() {
        let forecasts = Forecasts {
            solcast: vec![forecast(date(15), 5.0)],
            solar: vec![forecast(date(16), 3.0)],
            ..Forecasts::default()
        };
        let profile =
            GenerationProfile::try_new(&ChargeConfig::default(), &forecasts, &[], date(16)).unwrap();
        assert_eq!(profile.source, ForecastSource::Solar);
    }

    #[test]
    fn test_service_hourly_values_are_used_directly() {
        let forecasts =
            Forecasts { solcast: vec![forecast(date(16), 5.0)], ..Forecasts::default() };
        let profile =
            GenerationProfile::try_new(&ChargeConfig::default(), &forecasts, &[], date(16)).unwrap();
        let noon = date(16).and_hms_opt(12, 0, 0).unwrap();
        assert_abs_diff_eq!(profile.at(noon).0, 5.0);
        // The next day reuses the last covered one:
        assert_abs_diff_eq!(profile.at(noon + chrono::TimeDelta::days(1)).0, 5.0);
    }

    #[test]
    fn test_historical_fallback_with_adjustment() {
        let history = [
            DailyEnergy::flat(date(14), KilowattHours(4.0)),
            DailyEnergy::flat(date(15), KilowattHours(6.0)),
        ];
        let mut config = ChargeConfig::default();
        config.forecast_adjust.historical = Percent(50.0);
        let profile =
            GenerationProfile::try_new(&config, &Forecasts::default(), &history, date(16)).unwrap();
        assert_eq!(profile.source, ForecastSource::Historical);
        assert_abs_diff_eq!(profile.expected.0, 2.5, epsilon = 1e-9);
        // Shaped by the sun curve, so nothing at night:
        assert_eq!(profile.at(date(16).and_hms_opt(2, 0, 0).unwrap()), KilowattHours::ZERO);
    }

    #[test]
    fn test_historical_duplicate_dates_count_once() {
        let history = [
            DailyEnergy::flat(date(14), KilowattHours(2.0)),
            DailyEnergy::flat(date(15), KilowattHours(6.0)),
            DailyEnergy::flat(date(15), KilowattHours(6.0)),
        ];
        let config = ChargeConfig { generation_days: 2, ..ChargeConfig::default() };
        let profile =
            GenerationProfile::try_new(&config, &Forecasts::default(), &history, date(16)).unwrap();
        assert_abs_diff_eq!(profile.expected.0, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_forecast() {
        let result =
            GenerationProfile::try_new(&ChargeConfig::default(), &Forecasts::default(), &[], date(16));
        assert!(matches!(result, Err(PlanError::NoForecast)));
    }
}
