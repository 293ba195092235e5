//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the ingestion
//! loop. Events implement the `InternalEvent` trait which records the
//! corresponding Prometheus metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when events are received from the feed.
pub struct EventsReceived {
    pub count: u64,
}

impl InternalEvent for EventsReceived {
    fn emit(self) {
        trace!(count = self.count, "Events received");
        counter!("gale_events_received_total").increment(self.count);
    }
}

/// Event emitted when a batch finishes collecting.
pub struct BatchCollected {
    pub size: usize,
}

impl InternalEvent for BatchCollected {
    fn emit(self) {
        trace!(size = self.size, "Batch collected");
        counter!("gale_batches_collected_total").increment(1);
        histogram!("gale_batch_size").record(self.size as f64);
    }
}

/// Event emitted when a chunk is durably written to the store.
pub struct ChunkExported {
    pub bytes: u64,
    pub records: u64,
}

impl InternalEvent for ChunkExported {
    fn emit(self) {
        trace!(bytes = self.bytes, records = self.records, "Chunk exported");
        counter!("gale_chunks_exported_total").increment(1);
        counter!("gale_chunk_bytes_total").increment(self.bytes);
        counter!("gale_chunk_records_total").increment(self.records);
    }
}

/// Event emitted with the wall time of one export.
pub struct ChunkExportDuration {
    pub duration: Duration,
}

impl InternalEvent for ChunkExportDuration {
    fn emit(self) {
        histogram!("gale_chunk_export_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// How an ingestion cycle ended.
#[derive(Debug, Clone, Copy)]
pub enum CycleStatus {
    Exported,
    Drained,
    Cancelled,
}

impl CycleStatus {
    fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Exported => "exported",
            CycleStatus::Drained => "drained",
            CycleStatus::Cancelled => "cancelled",
        }
    }
}

/// Event emitted when an ingestion cycle completes.
pub struct CycleCompleted {
    pub status: CycleStatus,
}

impl InternalEvent for CycleCompleted {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Cycle completed");
        counter!("gale_cycles_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Storage operation type.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    List,
    Get,
    Put,
}

impl StorageOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::List => "list",
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_result(ok: bool) -> Self {
        if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted for each storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        counter!(
            "gale_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the duration of a storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "gale_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
