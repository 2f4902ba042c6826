use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::{
    cli::SourceArgs,
    core::{
        battery::BatteryModel,
        demand::DemandProfile,
        generation::GenerationProfile,
        plan_charge,
        window::{self, SelectedWindow},
    },
    prelude::*,
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[command(subcommand)]
    pub command: BurrowCommand,
}

#[derive(Subcommand)]
pub enum BurrowCommand {
    /// Show the battery model derived from the telemetry.
    Battery(SourceArgs),

    /// Show the selected window with the demand and generation profiles for it.
    Profiles(SourceArgs),

    /// Show the complete plan, including the hourly timeline and projections.
    Plan(SourceArgs),
}

#[derive(Serialize)]
struct Profiles {
    window: SelectedWindow,
    demand: DemandProfile,
    generation: GenerationProfile,
}

pub async fn burrow(args: BurrowArgs) -> Result {
    match args.command {
        BurrowCommand::Battery(source) => {
            let config = source.load_config()?;
            let snapshot = source.load_snapshot()?;
            let inputs = source.collect(&snapshot, &config, source.now()).await?;
            let battery = BatteryModel::try_new(
                &inputs.telemetry,
                inputs.min_soc,
                inputs.rating,
                &config,
            )?;
            println!("{}", serde_json::to_string_pretty(&battery)?);
        }
        BurrowCommand::Profiles(source) => {
            let now = source.now();
            let config = source.load_config()?;
            let snapshot = source.load_snapshot()?;
            let inputs = source.collect(&snapshot, &config, now).await?;
            let window = window::select(&config.windows, now)?;
            let target_date = window.ends_at.date();
            let profiles = Profiles {
                window,
                demand: DemandProfile::try_new(&config, &inputs.consumption_history, target_date)?,
                generation: GenerationProfile::try_new(
                    &config,
                    &inputs.forecasts,
                    &inputs.generation_history,
                    target_date,
                )?,
            };
            println!("{}", serde_json::to_string_pretty(&profiles)?);
        }
        BurrowCommand::Plan(source) => {
            let now = source.now();
            let config = source.load_config()?;
            let snapshot = source.load_snapshot()?;
            let inputs = source.collect(&snapshot, &config, now).await?;
            let plan = plan_charge(&inputs, &config, now)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }
    Ok(())
}
