//! Document types for the search indices.
//!
//! One document type per entity family. Every field except `id` is optional
//! so the same types describe both full documents (`created` events) and
//! partial documents (`updated` events carrying only changed fields).
//! Absent fields are skipped on serialization and therefore never overwrite
//! what is already in the index. A payload that sets a field to `null` also
//! decodes to `None`; projectors put those explicit clears back into the
//! partial body using the `FIELDS` list of each type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Document stored in the `users` index.
///
/// `full_name` is derived by the projector from `first_name` and `last_name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDocument {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_reference_list"
    )]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl UserDocument {
    /// Payload keys projected into the document. `fullName` is derived.
    pub const FIELDS: &'static [&'static str] = &[
        "email",
        "username",
        "firstName",
        "lastName",
        "isActive",
        "organizationId",
        "roles",
        "createdAt",
        "updatedAt",
    ];
}

/// Document stored in the `roles` index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleDocument {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_reference_list"
    )]
    pub permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_system: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl RoleDocument {
    /// Payload keys projected into the document.
    pub const FIELDS: &'static [&'static str] = &[
        "name",
        "description",
        "organizationId",
        "permissions",
        "isSystem",
        "createdAt",
        "updatedAt",
    ];
}

/// Document stored in the `permissions` index.
///
/// `key` is derived by the projector as `resource:action`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionDocument {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
}

impl PermissionDocument {
    /// Payload keys projected into the document. `key` is derived.
    pub const FIELDS: &'static [&'static str] = &[
        "name",
        "resource",
        "action",
        "description",
        "createdAt",
        "updatedAt",
    ];
}

/// Accepts a list of references given either as plain strings or as
/// objects carrying a `name` or `id` (e.g. `[{"id": "r1", "name": "admin"}]`).
/// Entries that are neither are dropped.
fn deserialize_reference_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|items| {
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Object(map) => map
                    .get("name")
                    .or_else(|| map.get("id"))
                    .and_then(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    }),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()
    }))
}
