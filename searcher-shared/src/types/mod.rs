//! This module defines the core data structures used across the searcher.
//! It re-exports the envelope, topic naming helpers and index documents.

pub mod documents;
pub mod entity_kind;
pub mod event_envelope;

pub use documents::{PermissionDocument, RoleDocument, UserDocument};
pub use entity_kind::{topic_name, EntityKind, TopicName};
pub use event_envelope::{EventEnvelope, EventMetadata, EventType};
