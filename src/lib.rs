//! gale: A library for streaming live event feeds into compressed CSV
//! chunks in object storage.
//!
//! This library provides components for subscribing to a cursor-based
//! event feed, collecting bounded batches, and exporting each batch as a
//! gzip-compressed CSV chunk named by its resumption cursor. Because every
//! chunk name embeds the cursor of its last event, a fresh process resumes
//! by listing the store — no separate checkpoint state exists.
//!
//! # Example
//!
//! ```ignore
//! use gale::{Config, run_ingestor, error::IngestError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), IngestError> {
//!     let config = Config::from_env()?;
//!     let stats = run_ingestor(config).await?;
//!     println!("Exported {} chunks", stats.chunks_exported);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod cursor;
pub mod error;
pub mod export;
pub mod feed;
pub mod ingestor;
pub mod metrics;
pub mod staging;
pub mod storage;

// Re-export main types
pub use config::Config;
pub use cursor::{Cursor, resolve_cursor};
pub use ingestor::{IngestStats, Ingestor, run_ingestor};
pub use storage::{StorageProvider, StorageProviderRef};
