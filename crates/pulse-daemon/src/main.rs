//! Pulse Daemon - edit activity monitor
//!
//! The Pulse daemon provides:
//! - Historical backfill followed by live stream ingestion
//! - Multi-resolution activity buckets and spike detection
//! - Spike notifications to an external endpoint
//! - REST API for bucket, entity and spike queries

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_daemon::{PulseConfig, RunOptions, Server};

/// Pulse Daemon CLI
#[derive(Parser)]
#[command(name = "pulsed")]
#[command(about = "Pulse Daemon - edit activity aggregation and spike detection", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PULSE_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides server.listen_addr)
    #[arg(short, long, env = "PULSE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (overrides logging.level)
    #[arg(long, env = "PULSE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "PULSE_LOG_JSON")]
    json: bool,

    /// Skip the historical backfill
    #[arg(long, env = "PULSE_SKIP_BACKFILL")]
    skip_backfill: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = PulseConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {listen}"))?;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        historical = %config.sources.historical_base_url,
        stream = %config.sources.live_stream_url,
        granularities = ?config.engine.buckets.granularities,
        "Starting pulsed"
    );

    // Create and run server
    let server = Server::new(config)?;
    server
        .run(RunOptions {
            skip_backfill: cli.skip_backfill,
        })
        .await?;
    Ok(())
}
