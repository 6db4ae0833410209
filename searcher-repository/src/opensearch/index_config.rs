//! Index settings and explicit field mappings.
//!
//! One definition per entity family. Identifiers and enumerations are
//! `keyword`, display names are `search_as_you_type` with a `raw` keyword
//! subfield for exact matches and sorting.

use searcher_shared::EntityKind;
use serde_json::{json, Value};

/// An index name together with its creation body (settings + mappings).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub body: Value,
}

impl IndexDefinition {
    /// Create a definition from explicit mapping properties, using the
    /// default shard/replica settings.
    pub fn new(name: impl Into<String>, properties: Value) -> Self {
        Self {
            name: name.into(),
            body: json!({
                "settings": {
                    "number_of_shards": 1,
                    "number_of_replicas": 1
                },
                "mappings": {
                    "dynamic": false,
                    "properties": properties
                }
            }),
        }
    }

    /// The definition of the index backing the given entity family.
    pub fn for_entity(kind: EntityKind) -> Self {
        match kind {
            EntityKind::User => Self::new(kind.index_name(), user_properties()),
            EntityKind::Role => Self::new(kind.index_name(), role_properties()),
            EntityKind::Permission => Self::new(kind.index_name(), permission_properties()),
        }
    }
}

fn searchable_name() -> Value {
    json!({
        "type": "search_as_you_type",
        "fields": {
            "raw": { "type": "keyword" }
        }
    })
}

fn user_properties() -> Value {
    json!({
        "id": { "type": "keyword" },
        "email": {
            "type": "keyword",
            "fields": {
                "text": { "type": "text" }
            }
        },
        "username": searchable_name(),
        "firstName": { "type": "text", "fields": { "raw": { "type": "keyword" } } },
        "lastName": { "type": "text", "fields": { "raw": { "type": "keyword" } } },
        "fullName": searchable_name(),
        "isActive": { "type": "boolean" },
        "organizationId": { "type": "keyword" },
        "roles": { "type": "keyword" },
        "createdAt": { "type": "date" },
        "updatedAt": { "type": "date" },
        "indexedAt": { "type": "date" }
    })
}

fn role_properties() -> Value {
    json!({
        "id": { "type": "keyword" },
        "name": searchable_name(),
        "description": { "type": "text" },
        "organizationId": { "type": "keyword" },
        "permissions": { "type": "keyword" },
        "isSystem": { "type": "boolean" },
        "createdAt": { "type": "date" },
        "updatedAt": { "type": "date" },
        "indexedAt": { "type": "date" }
    })
}

fn permission_properties() -> Value {
    json!({
        "id": { "type": "keyword" },
        "name": searchable_name(),
        "resource": { "type": "keyword" },
        "action": { "type": "keyword" },
        "key": { "type": "keyword" },
        "description": { "type": "text" },
        "createdAt": { "type": "date" },
        "updatedAt": { "type": "date" },
        "indexedAt": { "type": "date" }
    })
}
