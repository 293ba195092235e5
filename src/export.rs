//! Chunk export: batch → CSV → gzip → object store.
//!
//! The new cursor is derived from the last event of the batch rather than
//! from a server acknowledgment. The feed delivers events in `time_us`
//! order per connection, so the last event is also the newest; if a feed
//! ever reordered events this derivation could skip data on resume.
//!
//! Re-exporting the same batch produces the same key and the same bytes
//! (the encoder writes no timestamp), so overwriting after a crash is safe.

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use object_store::PutPayload;
use object_store::path::Path as ObjectPath;
use snafu::prelude::*;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::batch::Batch;
use crate::cursor::Cursor;
use crate::emit;
use crate::error::{
    CompressSnafu, ExportError, MalformedBatchSnafu, StagingSnafu, TabularSnafu, UploadSnafu,
};
use crate::feed::FeedEvent;
use crate::metrics::events::{ChunkExportDuration, ChunkExported};
use crate::staging::StagingArea;
use crate::storage::StorageProvider;

/// Header of the single passthrough column.
const DATA_COLUMN: &str = "data";

/// A chunk durably written to the store.
#[derive(Debug, Clone)]
pub struct ExportedChunk {
    /// Object key relative to the store prefix.
    pub key: String,
    /// Cursor the chunk is named by; the next cycle resumes here.
    pub cursor: Cursor,
    pub records: usize,
    pub bytes: usize,
}

/// Export a non-empty batch as `<cursor>.csv.gz` under the store prefix.
///
/// Intermediates are registered with the staging area, which removes them
/// whether or not the export succeeds.
pub async fn export_chunk(
    storage: &StorageProvider,
    staging: &mut StagingArea,
    batch: &Batch,
) -> Result<ExportedChunk, ExportError> {
    let cursor = batch
        .last()
        .and_then(FeedEvent::time_us)
        .map(Cursor::from_micros)
        .context(MalformedBatchSnafu)?;

    let start = Instant::now();

    let csv_path = staging.register(&format!("{cursor}.csv"));
    write_rows(&csv_path, batch)?;

    let gz_path = staging.register(&cursor.chunk_key());
    compress_file(&csv_path, &gz_path).context(CompressSnafu)?;

    let compressed = std::fs::read(&gz_path).context(StagingSnafu)?;
    let bytes = compressed.len();
    let key = cursor.chunk_key();
    storage
        .put_payload(
            &ObjectPath::from(key.as_str()),
            PutPayload::from(Bytes::from(compressed)),
        )
        .await
        .context(UploadSnafu)?;

    emit!(ChunkExported {
        bytes: bytes as u64,
        records: batch.len() as u64,
    });
    emit!(ChunkExportDuration {
        duration: start.elapsed(),
    });
    info!(
        "Exported chunk {} ({} records, {} bytes)",
        key,
        batch.len(),
        bytes
    );

    Ok(ExportedChunk {
        key,
        cursor,
        records: batch.len(),
        bytes,
    })
}

/// Write one JSON-encoded record per row under a single `data` column.
fn write_rows(path: &Path, batch: &Batch) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path).context(TabularSnafu)?;
    writer.write_record([DATA_COLUMN]).context(TabularSnafu)?;
    for event in batch.events() {
        writer.write_record([event.raw()]).context(TabularSnafu)?;
    }
    writer.flush().context(StagingSnafu)?;
    Ok(())
}

/// Gzip `src` into `dst`. The encoder writes no modification time, so the
/// output depends only on the input bytes.
fn compress_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(
        BufWriter::new(File::create(dst)?),
        Compression::default(),
    );
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(())
}
