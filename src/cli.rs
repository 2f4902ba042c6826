mod burrow;
mod hunt;

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime, Timelike};
use clap::{Parser, Subcommand};
use itertools::Itertools;

pub use self::{
    burrow::{BurrowArgs, burrow},
    hunt::{HuntArgs, hunt},
};
use crate::{
    api::{ForecastProvider, snapshot::Snapshot},
    config::ChargeConfig,
    core::PlanInputs,
    prelude::*,
    quantity::energy::KilowattHours,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: plan the grid charge and push the charge times to the inverter.
    #[clap(name = "hunt")]
    Hunt(Box<HuntArgs>),

    /// Development tools.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}

#[derive(Parser)]
pub struct SourceArgs {
    /// Device and forecast snapshot, TOML or JSON.
    #[clap(long = "snapshot", env = "SNAPSHOT_PATH", default_value = "snapshot.toml")]
    pub snapshot_path: PathBuf,

    #[clap(long, alias = "serial", env = "FOX_ESS_SERIAL_NUMBER")]
    pub serial_number: String,

    /// Charge configuration, the defaults apply when omitted.
    #[clap(long = "config", env = "CHARGE_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Expected PV generation per day, overrides the forecast services.
    #[clap(long = "forecast-kwh", env = "FORECAST_KWH")]
    pub manual_forecast: Option<KilowattHours>,

    /// Plan as if it were this local time, for example: `2025-11-16T22:30:00`.
    #[clap(long, env = "NOW")]
    pub now: Option<NaiveDateTime>,
}

impl SourceArgs {
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| {
            let now = Local::now().naive_local();
            now.with_nanosecond(0).unwrap_or(now)
        })
    }

    pub fn load_config(&self) -> Result<ChargeConfig> {
        match &self.config_path {
            Some(path) => ChargeConfig::from_toml_file(path),
            None => {
                info!("no config given, using the defaults");
                Ok(ChargeConfig::default())
            }
        }
    }

    pub fn load_snapshot(&self) -> Result<Snapshot> {
        Snapshot::from_file(&self.snapshot_path)
    }

    /// Gather the planner inputs from the snapshot, with the preferred forecast service first.
    pub async fn collect(
        &self,
        snapshot: &Snapshot,
        config: &ChargeConfig,
        now: NaiveDateTime,
    ) -> Result<PlanInputs> {
        let forecasts = config
            .preferred_forecast
            .with_fallback()
            .map(|service| snapshot.forecast(service));
        let providers =
            forecasts.iter().map(|forecast| forecast as &dyn ForecastProvider).collect_vec();
        PlanInputs::collect(
            snapshot,
            &self.serial_number,
            &providers,
            self.manual_forecast,
            config,
            now,
        )
        .await
    }
}
