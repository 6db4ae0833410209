//! Message types for the consumer.
//!
//! A [`ConsumedMessage`] is materialized once per poll and owns everything
//! needed to resolve it, so no borrowed Kafka message is held across awaits.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rdkafka::message::{Headers, Message};
use searcher_shared::EventEnvelope;
use serde::{Deserialize, Serialize};

use crate::errors::ConsumerError;

/// Header carrying the number of attempts already made for a message.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Dead-letter header carrying the topic the message was consumed from.
pub const ORIGINAL_TOPIC_HEADER: &str = "x-original-topic";

/// Dead-letter header carrying the last handler error.
pub const ERROR_HEADER: &str = "x-error";

/// A message pulled from a partition, with its payload decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    /// The decoded envelope, `None` for empty or undecodable payloads.
    pub value: Option<EventEnvelope>,
    /// The payload as text, kept only when it could not be decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<String>,
    /// Header values, decoded as UTF-8 (lossy).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip)]
    decode_error: Option<String>,
}

impl ConsumedMessage {
    /// Build a message from its coordinates and raw payload.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Option<&[u8]>) -> Self {
        let (value, raw_value, decode_error) = match payload {
            None | Some([]) => (None, None, None),
            Some(bytes) => match EventEnvelope::from_slice(bytes) {
                Ok(envelope) => (Some(envelope), None, None),
                Err(e) => (
                    None,
                    Some(String::from_utf8_lossy(bytes).into_owned()),
                    Some(e.to_string()),
                ),
            },
        };

        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value,
            raw_value,
            headers: BTreeMap::new(),
            timestamp: None,
            decode_error,
        }
    }

    /// Copy a Kafka message into an owned `ConsumedMessage`.
    pub fn from_kafka<M: Message>(msg: &M) -> Self {
        let mut consumed = Self::new(msg.topic(), msg.partition(), msg.offset(), msg.payload());
        consumed.key = msg
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned());
        consumed.timestamp = msg
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis);

        if let Some(headers) = msg.headers() {
            for header in headers.iter() {
                let value = header
                    .value
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .unwrap_or_default();
                consumed.headers.insert(header.key.to_string(), value);
            }
        }

        consumed
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// True for tombstones and zero-length payloads.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.decode_error.is_none()
    }

    /// Attempts already made, from the retry-count header (0 when absent or invalid).
    pub fn retry_count(&self) -> u32 {
        self.headers
            .get(RETRY_COUNT_HEADER)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// The decoded envelope, or the decode failure.
    pub fn envelope(&self) -> Result<&EventEnvelope, ConsumerError> {
        match (&self.value, &self.decode_error) {
            (Some(envelope), _) => Ok(envelope),
            (None, Some(e)) => Err(ConsumerError::decode(e.clone())),
            (None, None) => Err(ConsumerError::decode("empty payload")),
        }
    }
}

/// A message whose retries are exhausted, as written to the dead-letter topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub original_topic: String,
    pub message: ConsumedMessage,
    pub error: String,
    pub attempt_count: u32,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(
        message: &ConsumedMessage,
        error: impl Into<String>,
        attempt_count: u32,
        first_attempt_at: DateTime<Utc>,
    ) -> Self {
        Self {
            original_topic: message.topic.clone(),
            message: message.clone(),
            error: error.into(),
            attempt_count,
            first_attempt_at,
            last_attempt_at: Utc::now(),
        }
    }

    /// Headers attached to the dead-letter message.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (ORIGINAL_TOPIC_HEADER, self.original_topic.clone()),
            (ERROR_HEADER, self.error.clone()),
            (RETRY_COUNT_HEADER, self.attempt_count.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope_bytes() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt-1",
            "eventType": "created",
            "entityType": "user",
            "timestamp": "2024-05-01T12:00:00Z",
            "data": { "id": "u1" }
        }))
        .unwrap()
    }

    #[test]
    fn test_decodes_envelope() {
        let bytes = envelope_bytes();
        let msg = ConsumedMessage::new("user.created", 0, 5, Some(&bytes));

        assert!(!msg.is_empty());
        assert_eq!(msg.envelope().unwrap().entity_id().as_deref(), Some("u1"));
        assert!(msg.raw_value.is_none());
    }

    #[test]
    fn test_undecodable_payload_keeps_raw_text() {
        let msg = ConsumedMessage::new("user.created", 0, 5, Some(b"not json"));

        assert!(!msg.is_empty());
        assert!(matches!(msg.envelope(), Err(ConsumerError::DecodeError(_))));
        assert_eq!(msg.raw_value.as_deref(), Some("not json"));
    }

    #[test]
    fn test_empty_payload() {
        assert!(ConsumedMessage::new("user.created", 0, 1, None).is_empty());
        assert!(ConsumedMessage::new("user.created", 0, 1, Some(b"")).is_empty());
    }

    #[test]
    fn test_retry_count_header() {
        let msg = ConsumedMessage::new("role.created", 0, 1, None);
        assert_eq!(msg.retry_count(), 0);

        let msg = msg.with_header(RETRY_COUNT_HEADER, "2");
        assert_eq!(msg.retry_count(), 2);

        let msg = msg.with_header(RETRY_COUNT_HEADER, "two");
        assert_eq!(msg.retry_count(), 0);
    }

    #[test]
    fn test_dead_letter_record_wire_shape() {
        let bytes = envelope_bytes();
        let msg = ConsumedMessage::new("role.created", 2, 41, Some(&bytes)).with_key("r1");
        let record = DeadLetterRecord::new(&msg, "boom", 3, Utc::now());

        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["originalTopic"], "role.created");
        assert_eq!(value["attemptCount"], 3);
        assert_eq!(value["message"]["offset"], 41);
        assert_eq!(value["message"]["key"], "r1");
        assert_eq!(value["message"]["value"]["id"], "evt-1");
        assert_eq!(
            record.headers(),
            [
                ("x-original-topic", "role.created".to_string()),
                ("x-error", "boom".to_string()),
                ("x-retry-count", "3".to_string()),
            ]
        );
    }
}
