//! Integration tests for gale

use async_trait::async_trait;
use object_store::PutPayload;
use object_store::path::Path;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use gale::config::{Config, FeedConfig, IngestConfig, MetricsConfig, StoreConfig};
use gale::cursor::{Cursor, resolve_cursor};
use gale::error::{FeedError, IngestError};
use gale::feed::{EventSource, FeedConnector, FeedEvent, FeedPoll};
use gale::ingestor::Ingestor;
use gale::storage::{StorageProvider, StorageProviderRef, list_chunk_keys};

/// Yields queued polls, then reports the stream as ended.
struct ScriptedSource {
    polls: VecDeque<FeedPoll>,
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<FeedPoll, FeedError> {
        Ok(self.polls.pop_front().unwrap_or(FeedPoll::StreamEnded))
    }
}

/// Hands out one scripted subscription per cycle and records the cursor
/// each subscription was opened at.
struct ScriptedFeed {
    cycles: Mutex<VecDeque<Vec<FeedPoll>>>,
    cursors_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedFeed {
    fn new(cycles: Vec<Vec<FeedPoll>>) -> Arc<Self> {
        Arc::new(Self {
            cycles: Mutex::new(cycles.into()),
            cursors_seen: Mutex::new(Vec::new()),
        })
    }

    fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedConnector for ScriptedFeed {
    async fn connect(&self, cursor: Option<&Cursor>) -> Result<Box<dyn EventSource>, FeedError> {
        self.cursors_seen
            .lock()
            .unwrap()
            .push(cursor.map(|c| c.as_str().to_string()));

        let polls = self.cycles.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::new(ScriptedSource {
            polls: polls.into(),
        }))
    }
}

fn event(time_us: i64) -> FeedPoll {
    FeedPoll::Event(FeedEvent::from_raw(format!(
        r#"{{"did":"did:plc:test","kind":"commit","time_us":{time_us}}}"#
    )))
}

fn event_without_timestamp() -> FeedPoll {
    FeedPoll::Event(FeedEvent::from_raw(
        r#"{"did":"did:plc:test","kind":"identity"}"#.to_string(),
    ))
}

fn test_config(store: &TempDir, staging: &TempDir, max_messages: usize) -> Config {
    Config {
        store: StoreConfig {
            path: store.path().to_str().unwrap().to_string(),
            storage_options: Default::default(),
        },
        feed: FeedConfig::default(),
        ingest: IngestConfig {
            max_messages,
            staging_dir: staging.path().to_str().unwrap().to_string(),
            seed_cursor: None,
            from_live_tip: false,
        },
        metrics: MetricsConfig {
            enabled: false,
            address: String::new(),
        },
    }
}

async fn storage_for(dir: &TempDir) -> StorageProviderRef {
    Arc::new(
        StorageProvider::for_url(dir.path().to_str().unwrap())
            .await
            .unwrap(),
    )
}

async fn seed_chunk(storage: &StorageProvider, cursor: &str) {
    storage
        .put_payload(
            &Path::from(format!("{cursor}.csv.gz")),
            PutPayload::from_static(b"seed"),
        )
        .await
        .unwrap();
}

mod loop_scenarios {
    use super::*;

    /// MAX_MESSAGES=3, stream yields time_us [100,200,300] then closes:
    /// the full batch exports as 300.csv.gz and the next cycle resolves
    /// cursor 300.
    #[tokio::test]
    async fn full_batch_exports_and_advances_cursor() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        let feed = ScriptedFeed::new(vec![
            vec![event(100), event(200), event(300)],
            vec![], // second cycle: stream immediately ends
        ]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 3),
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        let stats = ingestor.run().await.unwrap();

        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["000.csv.gz", "300.csv.gz"]
        );
        assert_eq!(
            feed.cursors_seen(),
            vec![Some("000".to_string()), Some("300".to_string())]
        );
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.events_received, 3);
        assert_eq!(stats.chunks_exported, 1);
    }

    /// Stream yields 2 events then closes with MAX_MESSAGES=5: one export
    /// attempt for those 2 events, then the loop stops.
    #[tokio::test]
    async fn short_batch_gets_final_export_then_stops() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        let feed = ScriptedFeed::new(vec![vec![event(100), event(200)]]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        let stats = ingestor.run().await.unwrap();

        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["000.csv.gz", "200.csv.gz"]
        );
        assert_eq!(feed.cursors_seen(), vec![Some("000".to_string())]);
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.chunks_exported, 1);
    }

    /// An empty store with no seed policy stops the loop before the feed
    /// is ever contacted.
    #[tokio::test]
    async fn empty_store_halts_before_consuming() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;

        let feed = ScriptedFeed::new(vec![vec![event(100)]]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        let stats = ingestor.run().await.unwrap();

        assert!(feed.cursors_seen().is_empty());
        assert_eq!(stats.events_received, 0);
        assert!(list_chunk_keys(&storage).await.unwrap().is_empty());
    }

    /// An empty store with a seed cursor consumes from the seed.
    #[tokio::test]
    async fn seed_cursor_bootstraps_empty_store() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;

        let feed = ScriptedFeed::new(vec![vec![event(100), event(200)]]);

        let mut config = test_config(&store_dir, &staging_dir, 5);
        config.ingest.seed_cursor = Some("050".to_string());

        let mut ingestor = Ingestor::with_parts(
            config,
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        ingestor.run().await.unwrap();

        assert_eq!(feed.cursors_seen(), vec![Some("050".to_string())]);
        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["200.csv.gz"]
        );
    }

    /// With from_live_tip, an empty store connects with no cursor.
    #[tokio::test]
    async fn live_tip_connects_without_cursor() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;

        let feed = ScriptedFeed::new(vec![vec![event(100)]]);

        let mut config = test_config(&store_dir, &staging_dir, 5);
        config.ingest.from_live_tip = true;

        let mut ingestor = Ingestor::with_parts(
            config,
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        ingestor.run().await.unwrap();

        assert_eq!(feed.cursors_seen(), vec![None]);
        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["100.csv.gz"]
        );
    }

    /// A cycle that receives nothing exports nothing.
    #[tokio::test]
    async fn empty_batch_short_circuits_export() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        let feed = ScriptedFeed::new(vec![vec![]]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        let stats = ingestor.run().await.unwrap();

        assert_eq!(stats.chunks_exported, 0);
        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["000.csv.gz"]
        );
    }

    /// A batch whose last event lacks time_us aborts the run with an
    /// export error and leaves no new chunk behind.
    #[tokio::test]
    async fn malformed_batch_fails_the_run() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        let feed = ScriptedFeed::new(vec![vec![event(100), event_without_timestamp()]]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        let err = ingestor.run().await.unwrap_err();

        assert!(matches!(err, IngestError::ExportFailed { .. }));
        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["000.csv.gz"]
        );
    }

    /// Cancellation before a cycle discards the partial batch instead of
    /// exporting it.
    #[tokio::test]
    async fn cancellation_discards_partial_batch() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        let feed = ScriptedFeed::new(vec![vec![event(100), event(200), event(300)]]);

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed.clone(),
            shutdown,
        );
        let stats = ingestor.run().await.unwrap();

        assert_eq!(stats.chunks_exported, 0);
        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["000.csv.gz"]
        );
    }
}

mod resumption {
    use super::*;

    /// Resolving immediately after an export yields exactly the cursor the
    /// chunk was named from.
    #[tokio::test]
    async fn resolve_after_export_roundtrips_cursor() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "1733000000000000").await;

        let feed = ScriptedFeed::new(vec![vec![
            event(1733000000000100),
            event(1733000000000200),
        ]]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        ingestor.run().await.unwrap();

        let resolved = resolve_cursor(&storage).await.unwrap().unwrap();
        assert_eq!(resolved, Cursor::from_micros(1733000000000200));
    }

    /// A restarted process picks up exactly where the previous run's last
    /// durable chunk left off.
    #[tokio::test]
    async fn restart_resumes_from_last_chunk() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        // First run exports one full batch, then is stopped by a feed that
        // yields nothing.
        let feed = ScriptedFeed::new(vec![vec![event(100), event(200)], vec![]]);
        let mut first = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 2),
            storage.clone(),
            feed,
            CancellationToken::new(),
        );
        first.run().await.unwrap();

        // Second run (fresh process) must resume at 200.
        let feed = ScriptedFeed::new(vec![vec![event(300)]]);
        let mut second = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed.clone(),
            CancellationToken::new(),
        );
        second.run().await.unwrap();

        assert_eq!(feed.cursors_seen(), vec![Some("200".to_string())]);
        assert_eq!(
            list_chunk_keys(&storage).await.unwrap(),
            vec!["000.csv.gz", "200.csv.gz", "300.csv.gz"]
        );
    }

    /// Staging leaves nothing behind once a run finishes, regardless of
    /// how many cycles ran.
    #[tokio::test]
    async fn staging_dir_empty_after_run() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        let feed = ScriptedFeed::new(vec![vec![event(100), event(200)], vec![event(300)]]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 2),
            storage.clone(),
            feed,
            CancellationToken::new(),
        );
        ingestor.run().await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(staging_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty(), "staging files leaked: {leftovers:?}");
    }
}

mod chunk_format {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    /// Exported chunks decompress to a one-column CSV whose rows are the
    /// original JSON records, in arrival order.
    #[tokio::test]
    async fn chunk_rows_match_received_events() {
        let store_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let storage = storage_for(&store_dir).await;
        seed_chunk(&storage, "000").await;

        let feed = ScriptedFeed::new(vec![vec![event(100), event(200)]]);

        let mut ingestor = Ingestor::with_parts(
            test_config(&store_dir, &staging_dir, 5),
            storage.clone(),
            feed,
            CancellationToken::new(),
        );
        ingestor.run().await.unwrap();

        let compressed = storage.get("200.csv.gz").await.unwrap();
        let mut decompressed = String::new();
        GzDecoder::new(compressed.as_ref())
            .read_to_string(&mut decompressed)
            .unwrap();

        let mut reader = csv::Reader::from_reader(decompressed.as_bytes());
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            vec!["data"]
        );

        let rows: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains(r#""time_us":100"#));
        assert!(rows[1].contains(r#""time_us":200"#));
    }
}
