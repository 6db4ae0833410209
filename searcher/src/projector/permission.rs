//! Projection of permission events into the `permissions` index.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use searcher_repository::SearchIndexStore;
use searcher_shared::{EntityKind, EventEnvelope, EventType, PermissionDocument};
use tracing::instrument;

use serde_json::Value;

use super::{clear_field, decode, entity_id, is_cleared, is_present, log_outcome, partial_body};
use crate::errors::ProjectionError;
use crate::registry::EventHandler;

const KIND: EntityKind = EntityKind::Permission;

pub struct PermissionProjector {
    store: Arc<SearchIndexStore>,
}

impl PermissionProjector {
    pub fn new(store: Arc<SearchIndexStore>) -> Self {
        Self { store }
    }

    /// `resource:action`, when both parts are present and non-empty.
    fn permission_key(doc: &PermissionDocument) -> Option<String> {
        match (doc.resource.as_deref(), doc.action.as_deref()) {
            (Some(resource), Some(action)) if !resource.is_empty() && !action.is_empty() => {
                Some(format!("{}:{}", resource, action))
            }
            _ => None,
        }
    }

    fn document(id: String, envelope: &EventEnvelope) -> Result<PermissionDocument, ProjectionError> {
        let mut doc: PermissionDocument = decode(envelope)?;
        doc.id = id;
        doc.key = Self::permission_key(&doc);
        doc.indexed_at = Some(Utc::now());
        Ok(doc)
    }

    /// Body merged on `updated`. `key` is rewritten when both parts are in
    /// the payload, and cleared when either part is cleared.
    fn partial_document(id: String, envelope: &EventEnvelope) -> Result<Value, ProjectionError> {
        let doc = Self::document(id, envelope)?;
        let both_present = is_present(envelope, "resource") && is_present(envelope, "action");
        let clear_key = (both_present && doc.key.is_none())
            || is_cleared(envelope, "resource")
            || is_cleared(envelope, "action");

        let mut body = partial_body(envelope, &doc, PermissionDocument::FIELDS)?;
        if clear_key {
            clear_field(&mut body, "key");
        }
        Ok(body)
    }
}

#[async_trait]
impl EventHandler for PermissionProjector {
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
                let body = Self::partial_document(id.clone(), envelope)?;
                self.store.update(index, &id, &body).await?
            }
            EventType::Deleted => self.store.delete(index, &id).await?,
        };

        log_outcome(KIND, envelope.event_type, &id, outcome);
        Ok(())
    }
}
