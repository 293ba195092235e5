//! Resumption cursor discovery from previously exported chunks.
//!
//! Chunks are named `<cursor>.csv.gz`, where the cursor is the microsecond
//! timestamp of the last event they contain. Names therefore sort by time,
//! and the most recent chunk is simply the lexicographic maximum of the
//! listing — no separate checkpoint file is needed.

use std::fmt;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage::{CHUNK_SUFFIX, StorageProvider, list_chunk_keys};

/// Position in the event stream: a microsecond timestamp encoded as a
/// string, opaque to everything but the feed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap an externally supplied cursor value (e.g. a configured seed).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Cursor for an event timestamp.
    pub fn from_micros(time_us: i64) -> Self {
        Self(time_us.to_string())
    }

    /// Recover the cursor embedded in a chunk key, stripping any path
    /// components and the chunk suffix.
    pub fn from_chunk_key(key: &str) -> Option<Self> {
        let name = key.rsplit('/').next().unwrap_or(key);
        let stem = name.strip_suffix(CHUNK_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    /// Object key of the chunk named by this cursor.
    pub fn chunk_key(&self) -> String {
        format!("{}{}", self.0, CHUNK_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Find the resumption cursor: the cursor of the most recent chunk under
/// the configured prefix, or `None` when no chunks exist yet.
///
/// Pure read; a listing failure means no resumption point is available and
/// the caller decides whether to halt or start fresh.
pub async fn resolve_cursor(storage: &StorageProvider) -> Result<Option<Cursor>, StorageError> {
    let keys = list_chunk_keys(storage).await?;

    let cursor = keys.last().and_then(|key| Cursor::from_chunk_key(key));
    match &cursor {
        Some(cursor) => debug!("Resolved cursor {} from {} chunks", cursor, keys.len()),
        None => info!("No chunks found under configured prefix"),
    }

    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::PutPayload;
    use object_store::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_cursor_from_chunk_key() {
        let cursor = Cursor::from_chunk_key("1733000000000000.csv.gz").unwrap();
        assert_eq!(cursor.as_str(), "1733000000000000");
    }

    #[test]
    fn test_cursor_from_nested_chunk_key() {
        let cursor = Cursor::from_chunk_key("jetstream/chunks/1733000000000000.csv.gz").unwrap();
        assert_eq!(cursor.as_str(), "1733000000000000");
    }

    #[test]
    fn test_cursor_rejects_other_suffixes() {
        assert!(Cursor::from_chunk_key("1733000000000000.csv").is_none());
        assert!(Cursor::from_chunk_key("1733000000000000.json").is_none());
        assert!(Cursor::from_chunk_key(".csv.gz").is_none());
    }

    #[test]
    fn test_cursor_chunk_key_roundtrip() {
        let cursor = Cursor::from_micros(1733000000000000);
        assert_eq!(cursor.chunk_key(), "1733000000000000.csv.gz");
        assert_eq!(Cursor::from_chunk_key(&cursor.chunk_key()), Some(cursor));
    }

    #[test]
    fn test_cursor_ordering_matches_time() {
        let earlier = Cursor::from_micros(1733000000000000);
        let later = Cursor::from_micros(1733000000000001);
        assert!(earlier < later);
    }

    #[tokio::test]
    async fn test_resolve_cursor_picks_most_recent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        for name in ["1733000000000100.csv.gz", "1733000000000300.csv.gz"] {
            storage
                .put_payload(&Path::from(name), PutPayload::from_static(b"x"))
                .await
                .unwrap();
        }

        let cursor = resolve_cursor(&storage).await.unwrap().unwrap();
        assert_eq!(cursor.as_str(), "1733000000000300");
    }

    #[tokio::test]
    async fn test_resolve_cursor_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        assert!(resolve_cursor(&storage).await.unwrap().is_none());
    }

    /// Non-chunk objects under the prefix must not influence resolution.
    #[tokio::test]
    async fn test_resolve_cursor_ignores_foreign_objects() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        storage
            .put_payload(&Path::from("zzz-manifest.json"), PutPayload::from_static(b"x"))
            .await
            .unwrap();
        storage
            .put_payload(
                &Path::from("1733000000000100.csv.gz"),
                PutPayload::from_static(b"x"),
            )
            .await
            .unwrap();

        let cursor = resolve_cursor(&storage).await.unwrap().unwrap();
        assert_eq!(cursor.as_str(), "1733000000000100");
    }
}
