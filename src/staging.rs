//! Per-cycle local scratch space.
//!
//! Every file a cycle creates — the spooled batch, the tabular file, the
//! compressed chunk — is registered with the [`StagingArea`] and removed
//! when the guard drops, on success and failure alike. This replaces
//! best-effort cleanup blocks with scoped-resource acquisition: no exit
//! path can leak intermediates across cycles.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::feed::FeedEvent;

/// Scratch directory guard for one ingestion cycle.
pub struct StagingArea {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl StagingArea {
    /// Create the staging directory if it does not exist yet.
    pub fn create(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Vec::new(),
        })
    }

    /// Register a file for cleanup and return its full path. The file need
    /// not exist yet; missing files are skipped at cleanup.
    pub fn register(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        self.files.push(path.clone());
        path
    }

    /// Open the spool for the accumulating batch.
    pub fn spool(&mut self) -> io::Result<BatchSpool> {
        BatchSpool::create(self.register("batch.ndjson"))
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        for path in &self.files {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed staging file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove staging file {}: {}", path.display(), e),
            }
        }
    }
}

/// Durable spool for a batch under accumulation: one raw JSON line per
/// event, flushed as it is written, so a crash after consumption leaves
/// the received events on disk rather than only in memory.
pub struct BatchSpool {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl BatchSpool {
    fn create(path: PathBuf) -> io::Result<Self> {
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self { writer, path })
    }

    /// Append one event to the spool.
    pub fn append(&mut self, event: &FeedEvent) -> io::Result<()> {
        self.writer.write_all(event.raw().as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
