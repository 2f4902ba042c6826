use std::path::PathBuf;

use clap::Parser;

use crate::{
    cli::SourceArgs,
    core::{ScheduleEmitter, clock::DaylightSaving, generation::ForecastService, plan_charge},
    prelude::*,
};

#[derive(Parser)]
pub struct HuntArgs {
    /// Do not push the charge times to the inverter (dry run).
    #[clap(long)]
    pub scout: bool,

    /// Forecast service to try first, overrides the config.
    #[clap(long = "forecast-service", env = "FORECAST_SERVICE")]
    pub forecast_service: Option<ForecastService>,

    /// Where the snapshot device writes the charge times, logged otherwise.
    #[clap(long = "output", env = "CHARGE_TIMES_PATH")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub source: SourceArgs,
}

#[instrument(skip_all)]
pub async fn hunt(args: &HuntArgs) -> Result {
    let now = args.source.now();
    let mut config = args.source.load_config()?;
    if let Some(service) = args.forecast_service {
        config.preferred_forecast = service;
    }
    let snapshot = args.source.load_snapshot()?.with_output_path(args.output_path.clone());

    let inputs = args.source.collect(&snapshot, &config, now).await?;
    let plan = plan_charge(&inputs, &config, now).context("no action taken")?;
    info!(
        decision = ?plan.decision,
        charge_needed = ?plan.charge_needed,
        duration = ?plan.duration,
        start_time = %plan.start_time,
        end_time = %plan.end_time,
        start_soc = ?plan.start_soc,
        end_soc = ?plan.end_soc,
        projected_min = ?plan.projected_min_residual,
        projected_min_hour = plan.projected_min_hour,
        forecast_source = ?plan.forecast_source,
        demand_source = ?plan.demand_source,
        "planned",
    );

    let daylight_saving: Box<dyn DaylightSaving> = config.daylight_saving.into();
    let charge_times = ScheduleEmitter::builder()
        .device(&snapshot)
        .serial_number(&args.source.serial_number)
        .daylight_saving(daylight_saving.as_ref())
        .update(!args.scout)
        .build()
        .emit(&plan, now)
        .await?;
    if let Some(charge_times) = charge_times {
        println!("{charge_times}");
    }
    Ok(())
}
