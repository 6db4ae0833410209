//! Projection of user events into the `users` index.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use searcher_repository::SearchIndexStore;
use searcher_shared::{EntityKind, EventEnvelope, EventType, UserDocument};
use tracing::instrument;

use serde_json::Value;

use super::{clear_field, decode, entity_id, is_cleared, is_present, join_non_empty, log_outcome, partial_body};
use crate::errors::ProjectionError;
use crate::registry::EventHandler;

const KIND: EntityKind = EntityKind::User;

pub struct UserProjector {
    store: Arc<SearchIndexStore>,
}

impl UserProjector {
    pub fn new(store: Arc<SearchIndexStore>) -> Self {
        Self { store }
    }

    /// Document written on `created`. `fullName` is derived from whichever
    /// name parts are present.
    fn full_document(id: String, envelope: &EventEnvelope) -> Result<UserDocument, ProjectionError> {
        let mut doc: UserDocument = decode(envelope)?;
        doc.id = id;
        doc.full_name = join_non_empty([doc.first_name.as_deref(), doc.last_name.as_deref()]);
        doc.indexed_at = Some(Utc::now());
        Ok(doc)
    }

    /// Body merged on `updated`. `fullName` is rewritten when both name
    /// parts are in the payload, cleared when one part is cleared without the
    /// other, and left alone otherwise.
    fn partial_document(id: String, envelope: &EventEnvelope) -> Result<Value, ProjectionError> {
        let mut doc: UserDocument = decode(envelope)?;
        doc.id = id;
        doc.indexed_at = Some(Utc::now());

        let clear_full_name = if is_present(envelope, "firstName") && is_present(envelope, "lastName") {
            doc.full_name = join_non_empty([doc.first_name.as_deref(), doc.last_name.as_deref()]);
            doc.full_name.is_none()
        } else {
            is_cleared(envelope, "firstName") || is_cleared(envelope, "lastName")
        };

        let mut body = partial_body(envelope, &doc, UserDocument::FIELDS)?;
        if clear_full_name {
            clear_field(&mut body, "fullName");
        }
        Ok(body)
    }
}

#[async_trait]
impl EventHandler for UserProjector {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ProjectionError> {
        let id = entity_id(KIND, envelope)?;
        let index = KIND.index_name();

        let outcome = match envelope.event_type {
            EventType::Created => {
                let doc = Self::full_document(id.clone(), envelope)?;
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
