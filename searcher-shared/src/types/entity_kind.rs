//! Entity families and topic naming.
//!
//! Topics follow the `<entityType>.<created|updated|deleted>` convention,
//! e.g. `user.created` or `permission.deleted`.

use std::fmt;

use crate::types::event_envelope::EventType;

/// Entity families that are projected into the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Role,
    Permission,
}

impl EntityKind {
    /// All projected entity families.
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Role, EntityKind::Permission];

    /// Returns the entity type as it appears in envelopes and topic names.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Role => "role",
            EntityKind::Permission => "permission",
        }
    }

    /// Returns the name of the search index holding this entity family.
    pub fn index_name(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Role => "roles",
            EntityKind::Permission => "permissions",
        }
    }

    /// Topic carrying events of the given type for this entity family.
    pub fn topic(&self, event_type: EventType) -> String {
        topic_name(self.as_str(), event_type)
    }

    /// The created/updated/deleted topics for this entity family.
    pub fn topics(&self) -> Vec<String> {
        EventType::ALL.iter().map(|t| self.topic(*t)).collect()
    }

    /// Look up an entity family by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a topic name from an entity type and an event type.
pub fn topic_name(entity_type: &str, event_type: EventType) -> String {
    format!("{}.{}", entity_type, event_type.as_str())
}

/// A parsed `<entityType>.<eventType>` topic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicName {
    pub entity_type: String,
    pub event_type: EventType,
}

impl TopicName {
    /// Parse a topic name. Returns `None` for topics outside the convention
    /// (such as the dead-letter topic).
    pub fn parse(topic: &str) -> Option<Self> {
        let (entity_type, event_type) = topic.rsplit_once('.')?;
        if entity_type.is_empty() {
            return None;
        }
        Some(Self {
            entity_type: entity_type.to_string(),
            event_type: event_type.parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_for_entity() {
        assert_eq!(
            EntityKind::User.topics(),
            vec!["user.created", "user.updated", "user.deleted"]
        );
        assert_eq!(EntityKind::Permission.topic(EventType::Deleted), "permission.deleted");
    }

    #[test]
    fn test_index_names() {
        assert_eq!(EntityKind::User.index_name(), "users");
        assert_eq!(EntityKind::Role.index_name(), "roles");
        assert_eq!(EntityKind::Permission.index_name(), "permissions");
    }

    #[test]
    fn test_parse_topic() {
        let parsed = TopicName::parse("role.updated").unwrap();
        assert_eq!(parsed.entity_type, "role");
        assert_eq!(parsed.event_type, EventType::Updated);

        assert!(TopicName::parse("searcher.dlq").is_none());
        assert!(TopicName::parse("created").is_none());
        assert!(TopicName::parse(".created").is_none());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(EntityKind::from_name("role"), Some(EntityKind::Role));
        assert_eq!(EntityKind::from_name("organization"), None);
    }
}
