mod bus;
mod config;
mod database;
mod monitoring;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::bus::{StatusPublisher, StatusSubscriber};
use crate::config::Config;
use crate::database::{StatusRepository, StatusStore};
use crate::monitoring::{HealthScheduler, Prober};

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Probes HTTP endpoints for healthiness and propagates their status"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the configured endpoints and publish their status on the bus
    Watch,
    /// Consume status events from the bus and store them
    Collect,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Watch => watch(cli.config).await,
        Command::Collect => collect(cli.config).await,
    }
}

async fn watch(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::from_config(config_path)?.for_watch()?;

    let prober = Arc::new(Prober::new(config.probe_timeout)?);
    let publisher = Arc::new(StatusPublisher::connect(&config.bus)?);
    let mut scheduler = HealthScheduler::new(config.checks, prober, publisher)?;

    scheduler.start();
    tracing::info!("probing started, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;

    scheduler.stop();
    tracing::info!("probing stopped");
    Ok(())
}

async fn collect(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::from_config(config_path)?.for_collect()?;

    let pool = database::open(&config.database).await?;
    let store = StatusRepository::new_from_pool(pool);
    let mut subscriber = StatusSubscriber::connect(&config.bus)?;

    tracing::info!("collecting status events, press ctrl-c to stop");
    loop {
        tokio::select! {
            event = subscriber.next() => match event {
                Some((url, status)) => {
                    if let Err(err) = store.save(&url, &status).await {
                        tracing::error!(url = %url, error = %err, "can't store status event, skipping it");
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscriber.stop();
    tracing::info!("collector stopped");
    Ok(())
}
