//! Configuration parsing and validation.
//!
//! Configuration comes from a YAML file (with environment variable
//! interpolation) or, when no file is given, directly from the environment
//! variables the deployment contract recognizes: `BUCKET_PATH`,
//! `MAX_MESSAGES`, `FEED_ENDPOINT` and `WANTED_COLLECTIONS`.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyStorePathSnafu, InvalidMaxMessagesSnafu, MissingBucketPathSnafu,
    ReadFileSnafu, YamlParseSnafu, ZeroBatchThresholdSnafu,
};

/// Main configuration structure for the ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    /// Feed connection settings (optional, defaults to the public jetstream).
    #[serde(default)]
    pub feed: FeedConfig,
    /// Batch and staging settings (optional).
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store location and key prefix for exported chunks.
    /// Examples: "s3://bucket/jetstream", "gs://bucket/jetstream", "/local/chunks"
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Feed subscription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// WebSocket endpoint of the feed.
    #[serde(default = "default_feed_endpoint")]
    pub endpoint: String,

    /// Collection filter passed as `wantedCollections`.
    #[serde(default = "default_wanted_collections")]
    pub wanted_collections: String,

    /// Seconds to wait for a single receive before treating the batch as
    /// complete (default: 30). Keeps a stalled feed from blocking the loop.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: default_feed_endpoint(),
            wanted_collections: default_wanted_collections(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_feed_endpoint() -> String {
    "wss://jetstream1.us-east.bsky.network".to_string()
}

fn default_wanted_collections() -> String {
    "app.*".to_string()
}

fn default_read_timeout_secs() -> u64 {
    30
}

/// Batch collection and staging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Batch size threshold (default: 1000). A cycle that collects fewer
    /// events than this is treated as "no more data".
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Directory for per-cycle scratch files (spool, csv, gz).
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Cursor to start from when the store holds no chunks yet.
    #[serde(default)]
    pub seed_cursor: Option<String>,

    /// Start from the live tip of the feed when the store holds no chunks
    /// and no seed cursor is configured (default: false, i.e. halt).
    #[serde(default)]
    pub from_live_tip: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            staging_dir: default_staging_dir(),
            seed_cursor: None,
            from_live_tip: false,
        }
    }
}

fn default_max_messages() -> usize {
    1000
}

fn default_staging_dir() -> String {
    std::env::temp_dir()
        .join("gale")
        .to_string_lossy()
        .into_owned()
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file with env interpolation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        let content = vars::interpolate(&content)?;

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from environment variables alone.
    ///
    /// `BUCKET_PATH` is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("BUCKET_PATH").context(MissingBucketPathSnafu)?;

        let max_messages = match std::env::var("MAX_MESSAGES") {
            Ok(value) => value.parse().context(InvalidMaxMessagesSnafu)?,
            Err(_) => default_max_messages(),
        };

        let mut feed = FeedConfig::default();
        if let Ok(endpoint) = std::env::var("FEED_ENDPOINT") {
            feed.endpoint = endpoint;
        }
        if let Ok(collections) = std::env::var("WANTED_COLLECTIONS") {
            feed.wanted_collections = collections;
        }

        let config = Config {
            store: StoreConfig {
                path,
                storage_options: HashMap::new(),
            },
            feed,
            ingest: IngestConfig {
                max_messages,
                ..IngestConfig::default()
            },
            metrics: MetricsConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.store.path.is_empty(), EmptyStorePathSnafu);
        ensure!(self.ingest.max_messages > 0, ZeroBatchThresholdSnafu);
        Ok(())
    }
}
