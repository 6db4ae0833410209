//! Projectors from domain events to search documents.
//!
//! One projector per entity family. Each one registers itself for the
//! `<entity>.created`, `<entity>.updated` and `<entity>.deleted` topics and
//! writes through the shared [`SearchIndexStore`]:
//!
//! - `created` writes the full document, replacing any previous version;
//! - `updated` merges the fields present in the payload into the document;
//! - `deleted` removes the document (a missing document is fine).
//!
//! Documents are keyed by the entity id from `data.id`, never by the event
//! id, so replaying an event overwrites instead of duplicating.

mod permission;
mod role;
mod user;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use searcher_repository::{IndexDefinition, SearchIndexError, SearchIndexStore, WriteOutcome};
use searcher_shared::{EntityKind, EventEnvelope, EventType};
use tracing::{debug, info, warn};

use crate::errors::ProjectionError;
use crate::registry::{EventHandler, HandlerRegistry};

pub use permission::PermissionProjector;
pub use role::RoleProjector;
pub use user::UserProjector;

/// The projectors for every entity family, sharing one store.
pub struct Projectors {
    pub users: Arc<UserProjector>,
    pub roles: Arc<RoleProjector>,
    pub permissions: Arc<PermissionProjector>,
}

impl Projectors {
    pub fn new(store: Arc<SearchIndexStore>) -> Self {
        Self {
            users: Arc::new(UserProjector::new(store.clone())),
            roles: Arc::new(RoleProjector::new(store.clone())),
            permissions: Arc::new(PermissionProjector::new(store)),
        }
    }

    /// Register every projector for its entity's three topics.
    pub fn register_all(&self, registry: &mut HandlerRegistry) {
        register(registry, EntityKind::User, self.users.clone());
        register(registry, EntityKind::Role, self.roles.clone());
        register(registry, EntityKind::Permission, self.permissions.clone());
    }

    /// Index definitions of every projected entity family.
    pub fn index_definitions(&self) -> Vec<IndexDefinition> {
        EntityKind::ALL
            .into_iter()
            .map(IndexDefinition::for_entity)
            .collect()
    }
}

fn register(registry: &mut HandlerRegistry, kind: EntityKind, handler: Arc<dyn EventHandler>) {
    for topic in kind.topics() {
        registry.register(topic, handler.clone());
    }
}

/// Create every index that does not exist yet.
///
/// Failures are logged and the remaining indices are still attempted; the
/// first error is returned.
pub async fn ensure_indices(
    store: &SearchIndexStore,
    definitions: &[IndexDefinition],
) -> Result<(), SearchIndexError> {
    let mut first_error = None;
    for definition in definitions {
        match store.ensure_index(definition).await {
            Ok(WriteOutcome::Applied) => info!(index = %definition.name, "Index ready"),
            Ok(WriteOutcome::Skipped) => {
                warn!(index = %definition.name, "Search engine not ready, index creation deferred")
            }
            Err(e) => {
                warn!(index = %definition.name, error = %e, "Failed to ensure index");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// The entity id of the event. Events without one cannot be projected.
pub(crate) fn entity_id(kind: EntityKind, envelope: &EventEnvelope) -> Result<String, ProjectionError> {
    if envelope.entity_type != kind.as_str() {
        warn!(
            expected = kind.as_str(),
            entity_type = %envelope.entity_type,
            event_id = %envelope.id,
            "Envelope entity type does not match topic"
        );
    }
    envelope
        .entity_id()
        .ok_or_else(|| ProjectionError::missing_id(kind.topic(envelope.event_type)))
}

/// Decode the event payload into a document shape.
///
/// `id` is left out of decoding (numeric ids are allowed); callers set it
/// from [`entity_id`].
pub(crate) fn decode<T: DeserializeOwned>(envelope: &EventEnvelope) -> Result<T, ProjectionError> {
    let mut data = envelope.data.clone();
    match data.as_object_mut() {
        Some(fields) => {
            fields.remove("id");
        }
        None => {
            return Err(ProjectionError::malformed(format!(
                "event {} data is not an object",
                envelope.id
            )))
        }
    }
    serde_json::from_value(data)
        .map_err(|e| ProjectionError::malformed(format!("event {}: {}", envelope.id, e)))
}

/// Whether the payload carries `field` with an explicit `null`.
pub(crate) fn is_cleared(envelope: &EventEnvelope, field: &str) -> bool {
    matches!(envelope.data.get(field), Some(Value::Null))
}

/// Whether the payload carries `field` at all, `null` included.
pub(crate) fn is_present(envelope: &EventEnvelope, field: &str) -> bool {
    envelope.data.get(field).is_some()
}

/// Body merged into the stored document on `updated`.
///
/// The typed document supplies the fields with values. Every key of
/// `fields` that the payload sets to `null` is written as `null`, so the
/// stored value is cleared. Keys absent from the payload stay absent.
pub(crate) fn partial_body<T: Serialize>(
    envelope: &EventEnvelope,
    doc: &T,
    fields: &[&str],
) -> Result<Value, ProjectionError> {
    let mut body = serde_json::to_value(doc)
        .map_err(|e| ProjectionError::malformed(format!("event {}: {}", envelope.id, e)))?;
    if let Some(target) = body.as_object_mut() {
        for field in fields.iter().filter(|f| is_cleared(envelope, f)) {
            target.insert(field.to_string(), Value::Null);
        }
    }
    Ok(body)
}

/// Write `field` as `null` in a partial body.
pub(crate) fn clear_field(body: &mut Value, field: &str) {
    if let Some(target) = body.as_object_mut() {
        target.insert(field.to_string(), Value::Null);
    }
}

pub(crate) fn log_outcome(kind: EntityKind, event_type: EventType, id: &str, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Applied => debug!(
            entity = kind.as_str(),
            event_type = %event_type,
            entity_id = %id,
            "Projected event"
        ),
        WriteOutcome::Skipped => warn!(
            entity = kind.as_str(),
            event_type = %event_type,
            entity_id = %id,
            "Search engine not ready, projection skipped"
        ),
    }
}

/// Join the non-empty parts with a single space.
pub(crate) fn join_non_empty<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory provider shared by the projector tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use searcher_repository::{
        BatchOperationSummary, IndexDocument, SearchIndexError, SearchIndexProvider, SearchIndexStore,
    };
    use serde_json::{json, Value};

    #[derive(Default)]
    pub struct MemoryProvider {
        pub down: AtomicBool,
        pub docs: Mutex<HashMap<(String, String), Value>>,
    }

    impl MemoryProvider {
        pub fn doc(&self, index: &str, id: &str) -> Option<Value> {
            self.docs
                .lock()
                .unwrap()
                .get(&(index.to_string(), id.to_string()))
                .cloned()
        }

        fn check(&self) -> Result<(), SearchIndexError> {
            if self.down.load(Ordering::SeqCst) {
                Err(SearchIndexError::connection("down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SearchIndexProvider for MemoryProvider {
        async fn ping(&self) -> Result<(), SearchIndexError> {
            self.check()
        }
        async fn index_exists(&self, _index: &str) -> Result<bool, SearchIndexError> {
            self.check()?;
            Ok(true)
        }
        async fn create_index(&self, _index: &str, _definition: &Value) -> Result<(), SearchIndexError> {
            self.check()
        }
        async fn index_document(&self, index: &str, id: &str, document: &Value) -> Result<(), SearchIndexError> {
            self.check()?;
            self.docs
                .lock()
                .unwrap()
                .insert((index.to_string(), id.to_string()), document.clone());
            Ok(())
        }
        async fn update_document(&self, index: &str, id: &str, partial: &Value) -> Result<(), SearchIndexError> {
            self.check()?;
            let mut docs = self.docs.lock().unwrap();
            let doc = docs
                .entry((index.to_string(), id.to_string()))
                .or_insert_with(|| json!({}));
            if let (Some(target), Some(source)) = (doc.as_object_mut(), partial.as_object()) {
                for (k, v) in source {
                    target.insert(k.clone(), v.clone());
                }
            }
            Ok(())
        }
        async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
            self.check()?;
            self.docs
                .lock()
                .unwrap()
                .remove(&(index.to_string(), id.to_string()));
            Ok(())
        }
        async fn bulk_index_documents(
            &self,
            _index: &str,
            _documents: &[IndexDocument],
        ) -> Result<BatchOperationSummary, SearchIndexError> {
            unimplemented!("not used by projectors")
        }
        async fn count_documents(&self, index: &str) -> Result<u64, SearchIndexError> {
            self.check()?;
            Ok(self.docs.lock().unwrap().keys().filter(|(i, _)| i == index).count() as u64)
        }
    }

    pub async fn connected_store() -> (Arc<MemoryProvider>, Arc<SearchIndexStore>) {
        let provider = Arc::new(MemoryProvider::default());
        let store = Arc::new(SearchIndexStore::new(provider.clone()));
        store.connect().await;
        (provider, store)
    }
}
