#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod config;
mod core;
mod error;
mod prelude;
mod quantity;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command, burrow, hunt},
    prelude::*,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Hunt(args) => hunt(&args).await?,
        Command::Burrow(args) => burrow(*args).await?,
    }

    info!("done!");
    Ok(())
}
