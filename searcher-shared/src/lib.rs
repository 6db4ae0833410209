//! # Searcher Shared
//!
//! This crate defines the data structures shared across the searcher crates:
//! the event envelope published by producers, the entity families that are
//! projected into the search index, and the document shape of each index.

pub mod types;

pub use types::documents::{PermissionDocument, RoleDocument, UserDocument};
pub use types::entity_kind::{topic_name, EntityKind, TopicName};
pub use types::event_envelope::{EventEnvelope, EventMetadata, EventType};
