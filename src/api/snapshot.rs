//! Offline device and forecasts recorded in a single TOML or JSON document.

use std::{
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        Device,
        ForecastProvider,
        models::{BatteryTelemetry, DailyEnergy, DeviceRating, MinSoc},
    },
    core::{generation::ForecastService, schedule::ChargeTimes},
    prelude::*,
};

/// Everything the planner reads from the outside world at one moment.
///
/// Dates must be quoted strings in TOML.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// When set, requests for other devices are rejected.
    #[serde(default)]
    pub serial_number: Option<String>,

    pub telemetry: BatteryTelemetry,
    pub min_soc: MinSoc,

    #[serde(default)]
    pub rating: Option<DeviceRating>,

    #[serde(default)]
    pub consumption: Vec<DailyEnergy>,

    #[serde(default)]
    pub generation: Vec<DailyEnergy>,

    #[serde(default)]
    pub solcast: Vec<DailyEnergy>,

    #[serde(default)]
    pub solar: Vec<DailyEnergy>,

    /// Where the charge times go, logged otherwise.
    #[serde(skip)]
    output_path: Option<PathBuf>,
}

impl Snapshot {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let this: Self = if path.extension().is_some_and(|extension| extension == "json") {
            serde_json::from_str(&text).context("failed to parse the JSON snapshot")?
        } else {
            toml::from_str(&text).context("failed to parse the TOML snapshot")?
        };
        info!(
            n_consumption_days = this.consumption.len(),
            n_generation_days = this.generation.len(),
            n_solcast_days = this.solcast.len(),
            n_solar_days = this.solar.len(),
            "loaded",
        );
        Ok(this)
    }

    #[must_use]
    pub fn with_output_path(mut self, output_path: Option<PathBuf>) -> Self {
        self.output_path = output_path;
        self
    }

    #[must_use]
    pub const fn forecast(&self, service: ForecastService) -> SnapshotForecast<'_> {
        SnapshotForecast { snapshot: self, service }
    }

    fn check_serial_number(&self, serial_number: &str) -> Result {
        if let Some(expected) = &self.serial_number {
            ensure!(
                expected == serial_number,
                "the snapshot is for `{expected}`, not `{serial_number}`",
            );
        }
        Ok(())
    }

    fn within(days: &[DailyEnergy], dates: &RangeInclusive<NaiveDate>) -> Vec<DailyEnergy> {
        days.iter().filter(|day| dates.contains(&day.date)).cloned().collect()
    }
}

#[async_trait]
impl Device for Snapshot {
    async fn get_battery_telemetry(&self, serial_number: &str) -> Result<BatteryTelemetry> {
        self.check_serial_number(serial_number)?;
        Ok(self.telemetry)
    }

    async fn get_min_soc(&self, serial_number: &str) -> Result<MinSoc> {
        self.check_serial_number(serial_number)?;
        Ok(self.min_soc)
    }

    async fn get_consumption_history(
        &self,
        serial_number: &str,
        dates: RangeInclusive<NaiveDate>,
    ) -> Result<Vec<DailyEnergy>> {
        self.check_serial_number(serial_number)?;
        Ok(Self::within(&self.consumption, &dates))
    }

    async fn get_generation_history(
        &self,
        serial_number: &str,
        dates: RangeInclusive<NaiveDate>,
    ) -> Result<Vec<DailyEnergy>> {
        self.check_serial_number(serial_number)?;
        Ok(Self::within(&self.generation, &dates))
    }

    async fn get_device_rating(&self, serial_number: &str) -> Result<Option<DeviceRating>> {
        self.check_serial_number(serial_number)?;
        Ok(self.rating)
    }

    #[instrument(skip_all, fields(serial_number = serial_number))]
    async fn set_charge_times(&self, serial_number: &str, charge_times: &ChargeTimes) -> Result {
        self.check_serial_number(serial_number)?;
        let json = serde_json::to_string_pretty(charge_times)?;
        match &self.output_path {
            Some(path) => {
                tokio::fs::write(path, json)
                    .await
                    .with_context(|| format!("failed to write `{}`", path.display()))?;
                info!(path = %path.display(), "written");
            }
            None => info!("{json}"),
        }
        Ok(())
    }
}

/// Forecasts of one service recorded in the snapshot.
pub struct SnapshotForecast<'a> {
    snapshot: &'a Snapshot,
    service: ForecastService,
}

#[async_trait]
impl ForecastProvider for SnapshotForecast<'_> {
    fn service(&self) -> ForecastService {
        self.service
    }

    async fn get_forecast(&self, on: NaiveDate) -> Result<Option<DailyEnergy>> {
        let days = match self.service {
            ForecastService::Solcast => &self.snapshot.solcast,
            ForecastService::Solar => &self.snapshot.solar,
        };
        Ok(days.iter().find(|day| day.date == on).cloned())
    }
}
