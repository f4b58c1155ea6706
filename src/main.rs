// src/main.rs

//! rally-scout CLI
//!
//! Collaborator glue around the discovery core: one-shot cycles, a
//! repeating watch loop, and config validation. Notification events go
//! to the log; a chat frontend would plug in its own sink.

use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};

use rally_scout::error::Result;
use rally_scout::models::Config;
use rally_scout::pipeline::{
    CycleOutcome, NotificationEngine, NotificationEvent, NotificationSink, run_discovery_cycle,
};
use rally_scout::services::{CatalogWalker, Fetcher, HttpCatalogClient, HttpTransport, ImageCache};
use rally_scout::storage::JsonStateStore;

#[derive(Parser, Debug)]
#[command(
    name = "rally-scout",
    version,
    about = "Watches a vehicle-relocation catalog and notifies subscribers about new routes"
)]

/// CLI Arguments
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

/// CLI Commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single discovery cycle
    Discover {
        /// Notify as each route is discovered instead of after the walk
        #[arg(long)]
        realtime: bool,
    },
    /// Run discovery cycles on a fixed interval
    Watch {
        /// Minutes between cycles
        #[arg(long, default_value_t = 30)]
        interval_mins: u64,
        #[arg(long)]
        realtime: bool,
    },
    /// Validate the configuration file
    Validate,
}

/// Sink that writes notification events to the log.
struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, event: &NotificationEvent) {
        let side = if event.matched_as_origin {
            "from"
        } else {
            "to"
        };
        log::info!(
            "Notify {}: new route {} {} -> {} ({} windows, {})",
            event.subscriber,
            side,
            event.route.origin,
            event.route.destination,
            event.route.available_dates.len(),
            event.route.vehicle_model
        );
    }
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.logging.level),
    )
    .init();

    match cli.command {
        Command::Discover { realtime } => {
            config.validate()?;
            run_once(&config, realtime).await?;
        }
        Command::Watch {
            interval_mins,
            realtime,
        } => {
            config.validate()?;
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_mins * 60));
            loop {
                ticker.tick().await;
                // A failed cycle must not kill the watch loop.
                if let Err(e) = run_once(&config, realtime).await {
                    log::error!("Discovery cycle failed: {e}");
                }
            }
        }
        Command::Validate => {
            config.validate()?;
            println!("Configuration OK");
        }
    }

    Ok(())
}

/// Wire up one discovery cycle from configuration.
async fn run_once(config: &Config, realtime: bool) -> Result<CycleOutcome> {
    let transport = HttpTransport::new(&config.upstream.user_agent, config.fetcher.timeout_secs)?;
    let fetcher = Fetcher::new(transport, &config.fetcher);
    let client = HttpCatalogClient::new(fetcher, config.upstream.clone());
    let images = ImageCache::new(
        &config.paths.image_dir,
        &config.upstream.user_agent,
        config.fetcher.timeout_secs,
    )?;
    let walker = CatalogWalker::new(client, Some(images), &config.walker);

    let store = JsonStateStore::new(&config.paths.state_dir);
    let subscriptions = store.load_subscriptions().await?;
    let mut engine = NotificationEngine::load(store.clone()).await?;

    run_discovery_cycle(&walker, &mut engine, &store, &subscriptions, &LogSink, realtime).await
}
