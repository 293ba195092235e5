//! Live event feed subscription.
//!
//! Provides the WebSocket subscription to the feed and the trait seams
//! (`EventSource`, `FeedConnector`) that let the orchestrator run against
//! test doubles without network access.

pub mod event;
pub mod subscription;

pub use event::FeedEvent;
pub use subscription::{EventSource, FeedConnector, FeedPoll, Jetstream, Subscription};
