//! Projection of role events into the `roles` index.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use searcher_repository::SearchIndexStore;
use searcher_shared::{EntityKind, EventEnvelope, EventType, RoleDocument};
use tracing::instrument;

use super::{decode, entity_id, log_outcome, partial_body};
use crate::errors::ProjectionError;
use crate::registry::EventHandler;

const KIND: EntityKind = EntityKind::Role;

pub struct RoleProjector {
    store: Arc<SearchIndexStore>,
}

impl RoleProjector {
    pub fn new(store: Arc<SearchIndexStore>) -> Self {
        Self { store }
    }

    fn document(id: String, envelope: &EventEnvelope) -> Result<RoleDocument, ProjectionError> {
        let mut doc: RoleDocument = decode(envelope)?;
        doc.id = id;
        doc.indexed_at = Some(Utc::now());
        Ok(doc)
    }
}

#[async_trait]
impl EventHandler for RoleProjector {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ProjectionError> {
        let id = entity_id(KIND, envelope)?;
        let index = KIND.index_name();

        let outcome = match envelope.event_type {
            EventType::Created => {
                let doc = Self::document(id.clone(), envelope)?;
                self.store.upsert_document(index, &id, &doc).await?
            }
            EventType::Updated => {
                let doc = Self::document(id.clone(), envelope)?;
                let body = partial_body(envelope, &doc, RoleDocument::FIELDS)?;
                self.store.update(index, &id, &body).await?
            }
            EventType::Deleted => self.store.delete(index, &id).await?,
        };

        log_outcome(KIND, envelope.event_type, &id, outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::test_support::connected_store;
    use serde_json::json;

    fn event(event_type: EventType, data: serde_json::Value) -> EventEnvelope {
        EventEnvelope::new("evt", event_type, "role", data)
    }

    #[tokio::test]
    async fn test_created_twice_is_idempotent() {
        let (provider, store) = connected_store().await;
        let projector = RoleProjector::new(store.clone());
        let created = event(
            EventType::Created,
            json!({ "id": "r1", "name": "admin", "permissions": [{ "id": "p1", "name": "users:read" }] }),
        );

        projector.handle(&created).await.unwrap();
        projector.handle(&created).await.unwrap();

        assert_eq!(store.count("roles").await.unwrap(), 1);
        let doc = provider.doc("roles", "r1").unwrap();
        assert_eq!(doc["name"], "admin");
        assert_eq!(doc["permissions"], json!(["users:read"]));
    }

    #[tokio::test]
    async fn test_created_replaces_previous_document() {
        let (provider, store) = connected_store().await;
        let projector = RoleProjector::new(store);

        projector
            .handle(&event(EventType::Created, json!({ "id": "r1", "name": "old", "description": "d" })))
            .await
            .unwrap();
        projector
            .handle(&event(EventType::Created, json!({ "id": "r1", "name": "new" })))
            .await
            .unwrap();

        let doc = provider.doc("roles", "r1").unwrap();
        assert_eq!(doc["name"], "new");
        assert!(doc.get("description").is_none());
    }

    #[tokio::test]
    async fn test_updated_partial() {
        let (provider, store) = connected_store().await;
        let projector = RoleProjector::new(store);

        projector
            .handle(&event(EventType::Created, json!({ "id": "r1", "name": "admin", "isSystem": true })))
            .await
            .unwrap();
        projector
            .handle(&event(EventType::Updated, json!({ "id": "r1", "description": "Full access" })))
            .await
            .unwrap();

        let doc = provider.doc("roles", "r1").unwrap();
        assert_eq!(doc["name"], "admin");
        assert_eq!(doc["isSystem"], true);
        assert_eq!(doc["description"], "Full access");
    }

    #[tokio::test]
    async fn test_updated_null_clears_field() {
        let (provider, store) = connected_store().await;
        let projector = RoleProjector::new(store);

        projector
            .handle(&event(
                EventType::Created,
                json!({ "id": "r1", "name": "admin", "description": "x", "permissions": ["users:read"] }),
            ))
            .await
            .unwrap();
        projector
            .handle(&event(
                EventType::Updated,
                json!({ "id": "r1", "description": null, "permissions": null }),
            ))
            .await
            .unwrap();

        let doc = provider.doc("roles", "r1").unwrap();
        assert!(doc["description"].is_null());
        assert!(doc["permissions"].is_null());
        assert_eq!(doc["name"], "admin");
    }

    #[tokio::test]
    async fn test_wrong_field_type_is_malformed() {
        let (_, store) = connected_store().await;
        let projector = RoleProjector::new(store);

        let result = projector
            .handle(&event(EventType::Created, json!({ "id": "r1", "isSystem": "yes" })))
            .await;

        assert!(matches!(result, Err(ProjectionError::MalformedPayload(_))));
    }
}
