//! A single record received from the feed.

use serde::Deserialize;

/// One event from the stream.
///
/// The raw JSON text is retained verbatim — export is a passthrough
/// encoding, not a schema projection — alongside the `time_us` field
/// extracted at receipt. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    raw: String,
    time_us: Option<i64>,
}

/// Minimal view of an event used to pull out the timestamp.
#[derive(Deserialize)]
struct EventTime {
    time_us: Option<i64>,
}

impl FeedEvent {
    /// Wrap a raw feed message, extracting the microsecond timestamp when
    /// present. Records without the field (or that are not JSON objects)
    /// are kept — the exporter decides whether the batch is usable.
    pub fn from_raw(raw: String) -> Self {
        let time_us = serde_json::from_str::<EventTime>(&raw)
            .ok()
            .and_then(|event| event.time_us);
        Self { raw, time_us }
    }

    /// The message exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Monotonic feed timestamp, if the record carries one.
    pub fn time_us(&self) -> Option<i64> {
        self.time_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_time_us() {
        let event = FeedEvent::from_raw(
            r#"{"did":"did:plc:abc","time_us":1733000000000000,"kind":"commit"}"#.to_string(),
        );
        assert_eq!(event.time_us(), Some(1733000000000000));
    }

    #[test]
    fn test_missing_time_us() {
        let event = FeedEvent::from_raw(r#"{"did":"did:plc:abc","kind":"commit"}"#.to_string());
        assert_eq!(event.time_us(), None);
    }

    #[test]
    fn test_non_json_payload_is_kept() {
        let event = FeedEvent::from_raw("not json".to_string());
        assert_eq!(event.time_us(), None);
        assert_eq!(event.raw(), "not json");
    }

    #[test]
    fn test_raw_preserved_verbatim() {
        let raw = r#"{"time_us": 42,  "text": "spacing,\"quotes\" kept"}"#;
        let event = FeedEvent::from_raw(raw.to_string());
        assert_eq!(event.raw(), raw);
    }
}
