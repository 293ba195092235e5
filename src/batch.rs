//! Bounded batch collection from a live event source.

use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{FeedError, SpoolSnafu};
use crate::feed::{EventSource, FeedEvent, FeedPoll};
use crate::staging::BatchSpool;

/// Ordered, bounded collection of events gathered in one cycle.
///
/// Arrival order is preserved; the last event derives the next cursor.
#[derive(Debug, Default)]
pub struct Batch {
    events: Vec<FeedEvent>,
}

impl Batch {
    pub fn push(&mut self, event: FeedEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&FeedEvent> {
        self.events.last()
    }

    pub fn events(&self) -> &[FeedEvent] {
        &self.events
    }
}

impl FromIterator<FeedEvent> for Batch {
    fn from_iter<I: IntoIterator<Item = FeedEvent>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

/// How a collection cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEnd {
    /// The batch reached the configured threshold.
    Full,
    /// The remote side closed the subscription.
    StreamEnded,
    /// A receive hit the read timeout.
    TimedOut,
    /// Shutdown was requested; the partial batch must be discarded.
    Cancelled,
}

/// A batch together with how its collection ended.
#[derive(Debug)]
pub struct CollectedBatch {
    pub batch: Batch,
    pub end: BatchEnd,
}

/// Accumulate events until the batch is full, the stream ends, a receive
/// times out, or shutdown is requested.
///
/// Each accepted event is appended to the spool before it counts toward
/// the batch, so everything in the returned batch is also on disk. Spool
/// failures abort the cycle.
pub async fn collect_batch(
    source: &mut dyn EventSource,
    spool: &mut BatchSpool,
    max_messages: usize,
    shutdown: &CancellationToken,
) -> Result<CollectedBatch, FeedError> {
    let mut batch = Batch::default();

    let end = loop {
        if batch.len() >= max_messages {
            break BatchEnd::Full;
        }

        let poll = tokio::select! {
            biased;

            _ = shutdown.cancelled() => break BatchEnd::Cancelled,

            poll = source.next_event() => poll?,
        };

        match poll {
            FeedPoll::Event(event) => {
                spool.append(&event).context(SpoolSnafu {
                    path: spool.path().display().to_string(),
                })?;
                batch.push(event);
            }
            FeedPoll::StreamEnded => break BatchEnd::StreamEnded,
            FeedPoll::TimedOut => {
                debug!("Receive timed out with {} events buffered", batch.len());
                break BatchEnd::TimedOut;
            }
        }
    };

    info!("Collected {} events ({:?})", batch.len(), end);
    Ok(CollectedBatch { batch, end })
}
