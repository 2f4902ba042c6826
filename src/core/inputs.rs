//! Everything the planner needs, resolved before the planning starts.

use chrono::{Days, NaiveDateTime};
use serde::Serialize;

use crate::{
    api::{
        Device,
        ForecastProvider,
        models::{BatteryTelemetry, DailyEnergy, DeviceRating, MinSoc},
    },
    config::{ChargeConfig, ConsumptionSpan},
    core::generation::ForecastService,
    prelude::*,
    quantity::energy::KilowattHours,
};

/// Forecast days to fetch from each service, today included.
const FORECAST_DAYS: u64 = 3;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Forecasts {
    /// Manual override of the expected daily generation.
    pub manual: Option<KilowattHours>,

    pub solcast: Vec<DailyEnergy>,
    pub solar: Vec<DailyEnergy>,
}

impl Forecasts {
    #[must_use]
    pub fn get(&self, service: ForecastService) -> &[DailyEnergy] {
        match service {
            ForecastService::Solcast => &self.solcast,
            ForecastService::Solar => &self.solar,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanInputs {
    pub telemetry: BatteryTelemetry,
    pub min_soc: MinSoc,

    /// [`None`] when the model is unknown or the rating could not be fetched.
    pub rating: Option<DeviceRating>,

    pub consumption_history: Vec<DailyEnergy>,
    pub generation_history: Vec<DailyEnergy>,
    pub forecasts: Forecasts,
}

impl PlanInputs {
    /// Fetch the inputs from the collaborators.
    ///
    /// Telemetry and minimum state-of-charge are required. Everything else degrades:
    /// the planner decides later whether what is left is enough.
    #[instrument(skip_all, fields(serial_number = serial_number))]
    pub async fn collect(
        device: &dyn Device,
        serial_number: &str,
        providers: &[&dyn ForecastProvider],
        manual_forecast: Option<KilowattHours>,
        config: &ChargeConfig,
        now: NaiveDateTime,
    ) -> Result<Self> {
        let today = now.date();
        let yesterday = today - Days::new(1);

        let telemetry = device
            .get_battery_telemetry(serial_number)
            .await
            .context("failed to fetch the battery telemetry")?;
        let min_soc =
            device.get_min_soc(serial_number).await.context("failed to fetch the minimum SoC")?;

        let rating = match device.get_device_rating(serial_number).await {
            Ok(rating) => rating,
            Err(error) => {
                warn!("failed to fetch the device rating: {error:#}");
                None
            }
        };

        let consumption_days = match config.consumption_span {
            ConsumptionSpan::Days => config.consumption_days,
            ConsumptionSpan::Weeks => config.consumption_days * 7,
        };
        let consumption_history = Self::history_or_empty(
            "consumption",
            device
                .get_consumption_history(serial_number, today - days(consumption_days)..=yesterday)
                .await,
        );
        let generation_history = Self::history_or_empty(
            "generation",
            device
                .get_generation_history(serial_number, today - days(config.generation_days)..=yesterday)
                .await,
        );

        let mut forecasts = Forecasts { manual: manual_forecast, ..Forecasts::default() };
        if manual_forecast.is_none() {
            for provider in providers {
                let upcoming = provider.get_upcoming_forecasts(today, FORECAST_DAYS).await;
                match provider.service() {
                    ForecastService::Solcast => forecasts.solcast = upcoming,
                    ForecastService::Solar => forecasts.solar = upcoming,
                }
            }
        }

        info!(
            soc = ?telemetry.state_of_charge,
            n_consumption_days = consumption_history.len(),
            n_generation_days = generation_history.len(),
            n_solcast_days = forecasts.solcast.len(),
            n_solar_days = forecasts.solar.len(),
            "collected",
        );
        Ok(Self { telemetry, min_soc, rating, consumption_history, generation_history, forecasts })
    }

    fn history_or_empty(kind: &str, history: Result<Vec<DailyEnergy>>) -> Vec<DailyEnergy> {
        history.unwrap_or_else(|error| {
            warn!(kind, "failed to fetch the history: {error:#}");
            Vec::new()
        })
    }
}

fn days(n: usize) -> Days {
    Days::new(n as u64)
}
