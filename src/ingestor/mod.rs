//! Ingestion orchestrator.
//!
//! Drives repeated cycles of {resolve cursor → consume → export}. The loop
//! keeps no resumption state in memory: each cycle re-derives its position
//! from the chunks already in the store, so a restarted process continues
//! exactly where the last durable chunk left off. An external scheduler is
//! expected to restart the process for continuous operation.

mod signal;

use snafu::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::{BatchEnd, collect_batch};
use crate::config::Config;
use crate::cursor::{Cursor, resolve_cursor};
use crate::emit;
use crate::error::{
    ExportFailedSnafu, FeedSnafu, IngestError, IngestStorageSnafu, ResolveFailedSnafu,
    StagingSetupSnafu,
};
use crate::export::export_chunk;
use crate::feed::{FeedConnector, Jetstream};
use crate::metrics::events::{BatchCollected, CycleCompleted, CycleStatus, EventsReceived};
use crate::staging::StagingArea;
use crate::storage::{StorageProvider, StorageProviderRef};

/// Statistics about an ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    pub cycles: usize,
    pub events_received: usize,
    pub chunks_exported: usize,
    pub bytes_uploaded: usize,
}

/// Result of a single cycle.
enum CycleOutcome {
    /// A full batch was exported; keep consuming.
    Continue,
    /// The stream is drained (short or empty batch); stop.
    Drained,
    /// No resumption point exists and no seed policy is configured.
    NoCursor,
    /// Shutdown was requested mid-cycle; the partial batch was discarded.
    Cancelled,
}

/// Where a cycle should position its subscription.
enum ResumeFrom {
    Cursor(Cursor),
    LiveTip,
    Halt,
}

/// The ingestion loop.
pub struct Ingestor {
    config: Config,
    storage: StorageProviderRef,
    connector: Arc<dyn FeedConnector>,
    shutdown: CancellationToken,
    stats: IngestStats,
}

impl Ingestor {
    /// Create an ingestor from configuration.
    pub async fn new(config: Config, shutdown: CancellationToken) -> Result<Self, IngestError> {
        let storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.store.path,
                config.store.storage_options.clone(),
            )
            .await
            .context(IngestStorageSnafu)?,
        );

        let connector = Arc::new(Jetstream::new(config.feed.clone()));

        Ok(Self::with_parts(config, storage, connector, shutdown))
    }

    /// Assemble an ingestor from explicit collaborators.
    ///
    /// This is how tests substitute a scripted feed and a local store.
    pub fn with_parts(
        config: Config,
        storage: StorageProviderRef,
        connector: Arc<dyn FeedConnector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            storage,
            connector,
            shutdown,
            stats: IngestStats::default(),
        }
    }

    /// Run cycles until the stream drains, an export fails, or shutdown is
    /// requested.
    pub async fn run(&mut self) -> Result<IngestStats, IngestError> {
        info!(
            "Starting ingestion loop (batch threshold: {})",
            self.config.ingest.max_messages
        );

        loop {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, stopping");
                break;
            }

            self.stats.cycles += 1;
            match self.run_cycle().await? {
                CycleOutcome::Continue => {}
                CycleOutcome::Drained => {
                    info!("Stream drained, stopping");
                    break;
                }
                CycleOutcome::NoCursor => {
                    warn!("No resumption point in store and no seed configured, stopping");
                    break;
                }
                CycleOutcome::Cancelled => {
                    info!("Shutdown requested mid-cycle, partial batch discarded");
                    break;
                }
            }
        }

        Ok(self.stats.clone())
    }

    /// Run one {resolve → consume → export} cycle.
    async fn run_cycle(&mut self) -> Result<CycleOutcome, IngestError> {
        let cursor = match self.resume_position().await? {
            ResumeFrom::Cursor(cursor) => Some(cursor),
            ResumeFrom::LiveTip => None,
            ResumeFrom::Halt => return Ok(CycleOutcome::NoCursor),
        };

        let mut source = self
            .connector
            .connect(cursor.as_ref())
            .await
            .context(FeedSnafu)?;

        let mut staging =
            StagingArea::create(&self.config.ingest.staging_dir).context(StagingSetupSnafu)?;
        let mut spool = staging.spool().context(StagingSetupSnafu)?;

        let collected = collect_batch(
            source.as_mut(),
            &mut spool,
            self.config.ingest.max_messages,
            &self.shutdown,
        )
        .await
        .context(FeedSnafu)?;
        drop(spool);

        self.stats.events_received += collected.batch.len();
        emit!(EventsReceived {
            count: collected.batch.len() as u64
        });
        emit!(BatchCollected {
            size: collected.batch.len()
        });

        if collected.end == BatchEnd::Cancelled {
            emit!(CycleCompleted {
                status: CycleStatus::Cancelled
            });
            return Ok(CycleOutcome::Cancelled);
        }

        if collected.batch.is_empty() {
            emit!(CycleCompleted {
                status: CycleStatus::Drained
            });
            info!("No events received at cursor {:?}", cursor);
            return Ok(CycleOutcome::Drained);
        }

        let full = collected.batch.len() >= self.config.ingest.max_messages;
        let exported = export_chunk(&self.storage, &mut staging, &collected.batch)
            .await
            .context(ExportFailedSnafu {
                cursor: cursor.map(|c| c.to_string()).unwrap_or_default(),
                batch_size: collected.batch.len(),
            })?;

        self.stats.chunks_exported += 1;
        self.stats.bytes_uploaded += exported.bytes;
        emit!(CycleCompleted {
            status: CycleStatus::Exported
        });

        if full {
            info!(
                "Full batch exported, continuing from cursor {}",
                exported.cursor
            );
            Ok(CycleOutcome::Continue)
        } else {
            info!(
                "Short batch ({} < {}), exported final chunk {}",
                exported.records, self.config.ingest.max_messages, exported.key
            );
            Ok(CycleOutcome::Drained)
        }
    }

    /// Decide where this cycle resumes, applying the seed policy when the
    /// store holds no chunks yet.
    async fn resume_position(&self) -> Result<ResumeFrom, IngestError> {
        match resolve_cursor(&self.storage)
            .await
            .context(ResolveFailedSnafu)?
        {
            Some(cursor) => Ok(ResumeFrom::Cursor(cursor)),
            None => {
                if let Some(seed) = &self.config.ingest.seed_cursor {
                    info!("Store is empty, seeding cursor {}", seed);
                    Ok(ResumeFrom::Cursor(Cursor::new(seed.clone())))
                } else if self.config.ingest.from_live_tip {
                    info!("Store is empty, starting from the live tip");
                    Ok(ResumeFrom::LiveTip)
                } else {
                    Ok(ResumeFrom::Halt)
                }
            }
        }
    }
}

/// Run the ingestor with the given configuration, wiring up graceful
/// shutdown on process signals.
pub async fn run_ingestor(config: Config) -> Result<IngestStats, IngestError> {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let mut ingestor = Ingestor::new(config, shutdown).await?;
    ingestor.run().await
}
