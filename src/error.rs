//! Error types for gale using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error"))]
    GcsConfig { source: object_store::Error },

    /// Azure configuration error.
    #[snafu(display("Azure configuration error"))]
    AzureConfig { source: object_store::Error },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Store path is empty.
    #[snafu(display("Store path cannot be empty"))]
    EmptyStorePath,

    /// Batch threshold is zero.
    #[snafu(display("Batch threshold must be at least 1"))]
    ZeroBatchThreshold,

    /// BUCKET_PATH is required when no config file is given.
    #[snafu(display("BUCKET_PATH environment variable is not set"))]
    MissingBucketPath { source: std::env::VarError },

    /// MAX_MESSAGES could not be parsed as an integer.
    #[snafu(display("MAX_MESSAGES is not a valid number"))]
    InvalidMaxMessages { source: std::num::ParseIntError },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Feed Errors ============

/// Errors that can occur on the live feed subscription.
///
/// A remote close is deliberately NOT represented here: the consumer
/// surfaces it as an ordinary poll result, since disconnects are expected
/// steady-state behavior for a long-lived subscription.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FeedError {
    /// WebSocket handshake failed.
    #[snafu(display("Failed to connect to feed at {url}"))]
    Connect {
        source: tokio_tungstenite::tungstenite::Error,
        url: String,
    },

    /// The subscription returned a protocol-level error mid-stream.
    #[snafu(display("Feed receive failed"))]
    Receive {
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// Writing a received event to the local spool failed.
    #[snafu(display("Failed to spool event to {path}"))]
    Spool {
        source: std::io::Error,
        path: String,
    },
}

// ============ Export Errors ============

/// Errors that can occur while exporting a batch as a chunk.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExportError {
    /// The last event in the batch has no usable timestamp, so no
    /// resumption cursor can be derived from it.
    #[snafu(display("Last event in batch has no time_us field"))]
    MalformedBatch,

    /// Writing the tabular intermediate failed.
    #[snafu(display("Failed to write tabular file"))]
    Tabular { source: csv::Error },

    /// Gzip compression failed.
    #[snafu(display("Failed to compress chunk"))]
    Compress { source: std::io::Error },

    /// Reading or flushing a staging file failed.
    #[snafu(display("Staging IO failed"))]
    Staging { source: std::io::Error },

    /// Uploading the compressed chunk failed.
    #[snafu(display("Failed to upload chunk"))]
    Upload { source: StorageError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Ingest Error (top-level) ============

/// Top-level ingestion errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// Storage provider construction failed.
    #[snafu(display("Storage error"))]
    IngestStorage { source: StorageError },

    /// Listing the store to derive a resumption cursor failed.
    #[snafu(display("Cursor resolution failed"))]
    ResolveFailed { source: StorageError },

    /// Feed subscription error.
    #[snafu(display("Feed error"))]
    Feed { source: FeedError },

    /// Chunk export failed; the loop stops and the process exits non-zero.
    #[snafu(display("Export failed at cursor {cursor} ({batch_size} events)"))]
    ExportFailed {
        source: ExportError,
        cursor: String,
        batch_size: usize,
    },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Creating the per-cycle staging area failed.
    #[snafu(display("Failed to set up staging area"))]
    StagingSetup { source: std::io::Error },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },
}
