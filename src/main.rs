//! gale: A standalone tool for streaming live event feeds into compressed
//! CSV chunks in object storage.
//!
//! This tool subscribes to a cursor-based event feed (e.g. the Bluesky
//! Jetstream), buffers events into bounded batches, and writes each batch
//! as a gzip-compressed CSV chunk to S3, GCS, Azure, or a local directory,
//! resuming from the most recent chunk after every batch and restart.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gale::config::Config;
use gale::error::{AddressParseSnafu, ConfigSnafu, IngestError, MetricsSnafu};
use gale::run_ingestor;

/// Live feed to compressed CSV chunk streaming tool.
#[derive(Parser, Debug)]
#[command(name = "gale")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file. When omitted, configuration is read
    /// from environment variables (BUCKET_PATH, MAX_MESSAGES, ...).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without consuming the feed.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), IngestError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("gale starting");

    let config = build_config(&args)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        gale::metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Store: {}", config.store.path);
        info!("Feed: {}", config.feed.endpoint);
        info!("Collections: {}", config.feed.wanted_collections);
        info!("Batch threshold: {}", config.ingest.max_messages);
        info!("Staging dir: {}", config.ingest.staging_dir);
        info!("Configuration is valid");
        return Ok(());
    }

    // Run the ingestion loop
    let stats = run_ingestor(config).await?;

    info!("Ingestion completed");
    info!("  Cycles: {}", stats.cycles);
    info!("  Events received: {}", stats.events_received);
    info!("  Chunks exported: {}", stats.chunks_exported);
    info!("  Bytes uploaded: {}", stats.bytes_uploaded);

    Ok(())
}

/// Build configuration from arguments or the environment.
fn build_config(args: &Args) -> Result<Config, IngestError> {
    match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu),
        None => Config::from_env().context(ConfigSnafu),
    }
}
