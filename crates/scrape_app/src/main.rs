mod cli;
mod commands;
mod config;
mod render;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use scrape_client::ensure_state_dir;
use scrape_logging::{scrape_error, scrape_info, LogDestination};

use crate::cli::Cli;
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.global.config.as_deref())?;
    config.apply_overrides(&cli.global);
    ensure_state_dir(&config.state_dir)
        .with_context(|| format!("preparing {}", config.state_dir.display()))?;

    let (destination, level) = if cli.global.verbose {
        (LogDestination::Both(config.log_path()), LevelFilter::Debug)
    } else {
        (LogDestination::File(config.log_path()), LevelFilter::Info)
    };
    scrape_logging::initialize(destination, level);
    scrape_info!(
        "scrape {} using {}",
        env!("CARGO_PKG_VERSION"),
        config.client.api_base
    );

    let outcome = commands::run(cli.command, &config).await;
    if let Err(err) = &outcome {
        scrape_error!("{:#}", err);
    }
    outcome
}
