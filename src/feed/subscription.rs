//! WebSocket subscription to the feed.
//!
//! Receives are bounded by a read timeout and surfaced as an explicit
//! [`FeedPoll`] so the consumer loop has an ordinary exit condition for
//! every way a receive can end.

use async_trait::async_trait;
use futures::StreamExt;
use snafu::prelude::*;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::cursor::Cursor;
use crate::error::{ConnectSnafu, FeedError, ReceiveSnafu};
use crate::feed::FeedEvent;

/// Result of one receive attempt on the feed.
#[derive(Debug)]
pub enum FeedPoll {
    /// An event arrived.
    Event(FeedEvent),
    /// The remote side closed the subscription. Expected steady-state,
    /// never an error.
    StreamEnded,
    /// No event arrived within the read timeout.
    TimedOut,
}

/// A live source of feed events.
#[async_trait]
pub trait EventSource: Send {
    /// Receive the next event, bounded by the configured read timeout.
    async fn next_event(&mut self) -> Result<FeedPoll, FeedError>;
}

/// Opens one subscription per ingestion cycle, positioned at a cursor.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a subscription at `cursor`; `None` means the live tip.
    async fn connect(&self, cursor: Option<&Cursor>) -> Result<Box<dyn EventSource>, FeedError>;
}

/// An open WebSocket subscription.
pub struct Subscription {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    read_timeout: Duration,
}

impl Subscription {
    /// Connect to the given subscribe URL.
    pub async fn open(url: &str, read_timeout: Duration) -> Result<Self, FeedError> {
        let (stream, response) = connect_async(url).await.context(ConnectSnafu { url })?;
        debug!(status = %response.status(), "Subscription established");

        Ok(Self {
            stream,
            read_timeout,
        })
    }
}

#[async_trait]
impl EventSource for Subscription {
    async fn next_event(&mut self) -> Result<FeedPoll, FeedError> {
        loop {
            let message = match tokio::time::timeout(self.read_timeout, self.stream.next()).await {
                Err(_) => return Ok(FeedPoll::TimedOut),
                Ok(None) => return Ok(FeedPoll::StreamEnded),
                Ok(Some(message)) => message,
            };

            match message {
                Ok(Message::Text(text)) => {
                    return Ok(FeedPoll::Event(FeedEvent::from_raw(text.as_str().to_owned())));
                }
                Ok(Message::Close(frame)) => {
                    info!("Feed closed the subscription: {:?}", frame);
                    return Ok(FeedPoll::StreamEnded);
                }
                // Pings are answered by the protocol layer; binary frames
                // are not part of the plain-JSON subscription.
                Ok(_) => continue,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    return Ok(FeedPoll::StreamEnded);
                }
                Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)) => {
                    info!("Feed dropped without a closing handshake");
                    return Ok(FeedPoll::StreamEnded);
                }
                Err(source) => return Err(source).context(ReceiveSnafu),
            }
        }
    }
}

/// Connector for jetstream-style feeds
/// (`<endpoint>/subscribe?wantedCollections=<filter>&cursor=<cursor>`).
pub struct Jetstream {
    config: FeedConfig,
}

impl Jetstream {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    /// Build the subscribe URL. An empty cursor means "from now".
    fn subscribe_url(&self, cursor: Option<&Cursor>) -> String {
        format!(
            "{}/subscribe?wantedCollections={}&cursor={}",
            self.config.endpoint,
            self.config.wanted_collections,
            cursor.map(Cursor::as_str).unwrap_or_default(),
        )
    }
}

#[async_trait]
impl FeedConnector for Jetstream {
    async fn connect(&self, cursor: Option<&Cursor>) -> Result<Box<dyn EventSource>, FeedError> {
        let url = self.subscribe_url(cursor);
        info!("Subscribing at {}", url);

        let subscription =
            Subscription::open(&url, Duration::from_secs(self.config.read_timeout_secs)).await?;
        Ok(Box::new(subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jetstream() -> Jetstream {
        Jetstream::new(FeedConfig {
            endpoint: "wss://jetstream1.us-east.bsky.network".to_string(),
            wanted_collections: "app.*".to_string(),
            read_timeout_secs: 30,
        })
    }

    #[test]
    fn test_subscribe_url_with_cursor() {
        let cursor = Cursor::from_micros(1733000000000000);
        assert_eq!(
            jetstream().subscribe_url(Some(&cursor)),
            "wss://jetstream1.us-east.bsky.network/subscribe?wantedCollections=app.*&cursor=1733000000000000"
        );
    }

    #[test]
    fn test_subscribe_url_live_tip() {
        assert_eq!(
            jetstream().subscribe_url(None),
            "wss://jetstream1.us-east.bsky.network/subscribe?wantedCollections=app.*&cursor="
        );
    }
}
