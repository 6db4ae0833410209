//! Event envelope types.
//!
//! The envelope is the JSON structure producers publish onto the
//! `<entity>.<event>` topics. It is immutable once published.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of change an envelope describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    /// All event types, in topic registration order.
    pub const ALL: [EventType; 3] = [EventType::Created, EventType::Updated, EventType::Deleted];

    /// Returns the event type as it appears in topic names and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(EventType::Created),
            "updated" => Ok(EventType::Updated),
            "deleted" => Ok(EventType::Deleted),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// Optional tracing metadata carried by an envelope.
///
/// Unknown keys are preserved in `extra` so that re-publishing an envelope
/// (for example onto the dead-letter topic) does not lose information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A domain-change event as published by producers.
///
/// `data` is kept opaque here; each projector decodes the shape it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Event identifier (not the entity identifier).
    pub id: String,
    pub event_type: EventType,
    pub entity_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl EventEnvelope {
    /// Create a new envelope timestamped now.
    pub fn new(
        id: impl Into<String>,
        event_type: EventType,
        entity_type: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            event_type,
            entity_type: entity_type.into(),
            timestamp: Utc::now(),
            data,
            metadata: EventMetadata::default(),
        }
    }

    /// Decode an envelope from a raw message payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// The entity id carried in `data.id`, if any.
    ///
    /// Numeric ids are accepted and rendered as strings.
    pub fn entity_id(&self) -> Option<String> {
        match self.data.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_wire_envelope() {
        let raw = json!({
            "id": "evt-1",
            "eventType": "created",
            "entityType": "user",
            "timestamp": "2024-05-01T12:00:00.000Z",
            "data": { "id": "u1", "email": "a@x.com" },
            "metadata": { "correlationId": "c-1", "source": "api", "requestIp": "10.0.0.1" }
        });

        let envelope: EventEnvelope = serde_json::from_value(raw).unwrap();

        assert_eq!(envelope.event_type, EventType::Created);
        assert_eq!(envelope.entity_type, "user");
        assert_eq!(envelope.entity_id(), Some("u1".to_string()));
        assert_eq!(envelope.metadata.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(envelope.metadata.extra["requestIp"], "10.0.0.1");
    }

    #[test]
    fn test_missing_metadata_defaults() {
        let raw = br#"{"id":"e","eventType":"deleted","entityType":"role","timestamp":"2024-05-01T12:00:00Z","data":{"id":7}}"#;

        let envelope = EventEnvelope::from_slice(raw).unwrap();

        assert_eq!(envelope.metadata, EventMetadata::default());
        assert_eq!(envelope.entity_id(), Some("7".to_string()));
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let raw = br#"{"id":"e","eventType":"archived","entityType":"role","timestamp":"2024-05-01T12:00:00Z","data":{}}"#;
        assert!(EventEnvelope::from_slice(raw).is_err());
    }

    #[test]
    fn test_entity_id_absent_or_empty() {
        let mut envelope = EventEnvelope::new("e", EventType::Updated, "user", json!({}));
        assert_eq!(envelope.entity_id(), None);

        envelope.data = json!({ "id": "" });
        assert_eq!(envelope.entity_id(), None);
    }

    #[test]
    fn test_event_type_parse_and_display() {
        for event_type in EventType::ALL {
            assert_eq!(event_type.as_str().parse::<EventType>(), Ok(event_type));
            assert_eq!(event_type.to_string(), event_type.as_str());
        }
    }
}
