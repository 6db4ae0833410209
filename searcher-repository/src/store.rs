//! Search index store.
//!
//! `SearchIndexStore` is the operational wrapper every projector writes
//! through. It owns the last known connectivity state of the search engine
//! and applies the degraded-mode policy:
//!
//! - while not ready, writes are not attempted and report [`WriteOutcome::Skipped`];
//! - a write that fails with a connection error flips the store to not ready
//!   and also reports `Skipped`;
//! - any other failure is returned to the caller.
//!
//! Readiness is regained through [`SearchIndexStore::refresh`], which also
//! re-creates any index registered with [`SearchIndexStore::ensure_index`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SearchIndexStoreConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::IndexDefinition;
use crate::types::{BatchOperationSummary, IndexDocument, WriteOutcome};
use crate::utils::validate_document_id;

/// The degraded-mode wrapper around a `SearchIndexProvider`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use searcher_repository::{OpenSearchProvider, SearchIndexConfig, SearchIndexStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = OpenSearchProvider::new(&SearchIndexConfig::new("http://localhost:9200"))?;
/// let store = SearchIndexStore::new(Arc::new(provider));
///
/// // Never fails: an unreachable engine only leaves the store not ready
/// store.connect().await;
///
/// let outcome = store
///     .update("users", "u1", &serde_json::json!({ "firstName": "Jo" }))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SearchIndexStore {
    provider: Arc<dyn SearchIndexProvider>,
    config: SearchIndexStoreConfig,
    ready: AtomicBool,
    closed: AtomicBool,
    indices: Mutex<Vec<IndexDefinition>>,
}

impl SearchIndexStore {
    /// Create a store with default configuration. The store starts not ready
    /// until [`connect`](Self::connect) succeeds.
    pub fn new(provider: Arc<dyn SearchIndexProvider>) -> Self {
        Self::with_config(provider, SearchIndexStoreConfig::default())
    }

    /// Create a store with custom configuration.
    pub fn with_config(provider: Arc<dyn SearchIndexProvider>, config: SearchIndexStoreConfig) -> Self {
        Self {
            provider,
            config,
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            indices: Mutex::new(Vec::new()),
        }
    }

    /// Attempt one connectivity check.
    ///
    /// On failure the error is logged and the store stays in degraded mode;
    /// the process is expected to keep consuming. Returns the resulting readiness.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> bool {
        match self.provider.ping().await {
            Ok(()) => {
                self.ready.store(true, Ordering::SeqCst);
                info!("Connected to search engine");
                true
            }
            Err(e) => {
                self.ready.store(false, Ordering::SeqCst);
                error!(
                    error = %e,
                    "Search engine unreachable, continuing in degraded mode"
                );
                false
            }
        }
    }

    /// Last known connectivity state.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Re-check connectivity. When readiness is regained, every registered
    /// index is ensured again. Returns the resulting readiness.
    pub async fn refresh(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        let was_ready = self.is_ready();
        let now_ready = match self.provider.ping().await {
            Ok(()) => true,
            Err(e) => {
                if was_ready {
                    warn!(error = %e, "Search engine became unreachable");
                }
                false
            }
        };
        self.ready.store(now_ready, Ordering::SeqCst);

        if now_ready && !was_ready {
            info!("Search engine reachable again, leaving degraded mode");
            let definitions = self.registered_indices();
            for definition in definitions {
                if let Err(e) = self.create_if_absent(&definition).await {
                    warn!(index = %definition.name, error = %e, "Failed to ensure index after reconnect");
                }
            }
        }

        now_ready
    }

    /// Create the index with explicit mappings if it does not exist yet.
    ///
    /// Idempotent. The definition is remembered so that it can be re-applied
    /// after the engine comes back; when the store is not ready this only
    /// registers the definition and returns `Skipped`.
    #[instrument(skip(self, definition), fields(index = %definition.name))]
    pub async fn ensure_index(&self, definition: &IndexDefinition) -> Result<WriteOutcome, SearchIndexError> {
        self.register_index(definition);

        if !self.is_ready() {
            debug!("Search engine not ready, deferring index creation");
            return Ok(WriteOutcome::Skipped);
        }

        let result = self.create_if_absent(definition).await;
        self.guard(result)
    }

    /// Write a full document keyed by `id`, replacing any previous version.
    pub async fn upsert(&self, index: &str, id: &str, document: &Value) -> Result<WriteOutcome, SearchIndexError> {
        validate_document_id(id)?;
        if !self.is_ready() {
            return Ok(self.skip("upsert", index, id));
        }
        let result = self.provider.index_document(index, id, document).await;
        self.guard(result)
    }

    /// Merge a partial document into the document keyed by `id`, creating it if absent.
    pub async fn update(&self, index: &str, id: &str, partial: &Value) -> Result<WriteOutcome, SearchIndexError> {
        validate_document_id(id)?;
        if !self.is_ready() {
            return Ok(self.skip("update", index, id));
        }
        let result = self.provider.update_document(index, id, partial).await;
        self.guard(result)
    }

    /// Delete the document keyed by `id`. A missing document is not an error.
    pub async fn delete(&self, index: &str, id: &str) -> Result<WriteOutcome, SearchIndexError> {
        validate_document_id(id)?;
        if !self.is_ready() {
            return Ok(self.skip("delete", index, id));
        }
        let result = self.provider.delete_document(index, id).await;
        self.guard(result)
    }

    /// Serialize a typed document and [`upsert`](Self::upsert) it.
    pub async fn upsert_document<T: Serialize + Sync>(
        &self,
        index: &str,
        id: &str,
        document: &T,
    ) -> Result<WriteOutcome, SearchIndexError> {
        let body = to_value(document)?;
        self.upsert(index, id, &body).await
    }

    /// Write many full documents in one request.
    ///
    /// Returns a skipped summary when the store is degraded.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        self.validate_batch_size(documents.len())?;
        for document in documents {
            validate_document_id(&document.id)?;
        }
        if documents.is_empty() {
            return Ok(BatchOperationSummary::default());
        }
        if !self.is_ready() {
            debug!(index = %index, "Search engine not ready, skipping bulk upsert");
            return Ok(BatchOperationSummary::skipped(documents.len()));
        }

        match self.provider.bulk_index_documents(index, documents).await {
            Ok(summary) => {
                if summary.failed > 0 {
                    warn!(
                        index = %index,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        "Bulk upsert completed with some failures"
                    );
                }
                Ok(summary)
            }
            Err(e) if e.is_connection() => {
                self.mark_unavailable(&e);
                Ok(BatchOperationSummary::skipped(documents.len()))
            }
            Err(e) => Err(e),
        }
    }

    /// Number of documents in the index; 0 if the index does not exist yet.
    ///
    /// Unlike writes, a count cannot be skipped: a degraded store reports a
    /// connection error so callers do not mistake "unknown" for "empty".
    pub async fn count(&self, index: &str) -> Result<u64, SearchIndexError> {
        if !self.is_ready() {
            return Err(SearchIndexError::connection("Search engine is not ready"));
        }
        match self.provider.count_documents(index).await {
            Err(e) if e.is_connection() => {
                self.mark_unavailable(&e);
                Err(e)
            }
            other => other,
        }
    }

    /// Stop using the search engine. Subsequent writes are skipped and
    /// `refresh` no longer re-establishes readiness.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        info!("Search index store closed");
    }

    fn validate_batch_size(&self, size: usize) -> Result<(), SearchIndexError> {
        if let Some(max) = self.config.max_batch_size {
            if size > max {
                return Err(SearchIndexError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }

    async fn create_if_absent(&self, definition: &IndexDefinition) -> Result<(), SearchIndexError> {
        if self.provider.index_exists(&definition.name).await? {
            debug!(index = %definition.name, "Index already exists");
            return Ok(());
        }
        self.provider
            .create_index(&definition.name, &definition.body)
            .await
    }

    fn register_index(&self, definition: &IndexDefinition) {
        let mut indices = self.indices.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = indices.iter_mut().find(|d| d.name == definition.name) {
            *existing = definition.clone();
        } else {
            indices.push(definition.clone());
        }
    }

    fn registered_indices(&self) -> Vec<IndexDefinition> {
        self.indices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn guard(&self, result: Result<(), SearchIndexError>) -> Result<WriteOutcome, SearchIndexError> {
        match result {
            Ok(()) => Ok(WriteOutcome::Applied),
            Err(e) if e.is_connection() => {
                self.mark_unavailable(&e);
                Ok(WriteOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    fn skip(&self, operation: &str, index: &str, id: &str) -> WriteOutcome {
        debug!(
            operation = operation,
            index = %index,
            doc_id = %id,
            "Search engine not ready, skipping write"
        );
        WriteOutcome::Skipped
    }

    fn mark_unavailable(&self, error: &SearchIndexError) {
        if self.ready.swap(false, Ordering::SeqCst) {
            error!(error = %error, "Lost connection to search engine, entering degraded mode");
        }
    }
}

fn to_value<T: Serialize>(document: &T) -> Result<Value, SearchIndexError> {
    serde_json::to_value(document).map_err(|e| SearchIndexError::serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// In-memory provider with a switchable connection.
    #[derive(Default)]
    struct MockProvider {
        down: AtomicBool,
        reject_writes: AtomicBool,
        documents: Mutex<HashMap<(String, String), Value>>,
        created_indices: Mutex<Vec<String>>,
        write_calls: AtomicUsize,
    }

    impl MockProvider {
        fn check(&self) -> Result<(), SearchIndexError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(SearchIndexError::connection("connection refused"));
            }
            Ok(())
        }

        fn write(&self) -> Result<(), SearchIndexError> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(SearchIndexError::index("mapper_parsing_exception"));
            }
            Ok(())
        }

        fn doc(&self, index: &str, id: &str) -> Option<Value> {
            self.documents
                .lock()
                .unwrap()
                .get(&(index.to_string(), id.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl SearchIndexProvider for MockProvider {
        async fn ping(&self) -> Result<(), SearchIndexError> {
            self.check()
        }

        async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
            self.check()?;
            Ok(self.created_indices.lock().unwrap().iter().any(|i| i == index))
        }

        async fn create_index(&self, index: &str, _definition: &Value) -> Result<(), SearchIndexError> {
            self.check()?;
            self.created_indices.lock().unwrap().push(index.to_string());
            Ok(())
        }

        async fn index_document(&self, index: &str, id: &str, document: &Value) -> Result<(), SearchIndexError> {
            self.write()?;
            self.documents
                .lock()
                .unwrap()
                .insert((index.to_string(), id.to_string()), document.clone());
            Ok(())
        }

        async fn update_document(&self, index: &str, id: &str, partial: &Value) -> Result<(), SearchIndexError> {
            self.write()?;
            let mut documents = self.documents.lock().unwrap();
            let entry = documents
                .entry((index.to_string(), id.to_string()))
                .or_insert_with(|| json!({}));
            if let (Some(target), Some(source)) = (entry.as_object_mut(), partial.as_object()) {
                for (k, v) in source {
                    target.insert(k.clone(), v.clone());
                }
            }
            Ok(())
        }

        async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
            self.write()?;
            self.documents
                .lock()
                .unwrap()
                .remove(&(index.to_string(), id.to_string()));
            Ok(())
        }

        async fn bulk_index_documents(
            &self,
            index: &str,
            documents: &[IndexDocument],
        ) -> Result<BatchOperationSummary, SearchIndexError> {
            self.check()?;
            let mut results = Vec::new();
            for document in documents {
                self.index_document(index, &document.id, &document.body).await?;
                results.push(crate::types::BatchOperationResult {
                    id: document.id.clone(),
                    success: true,
                    error: None,
                });
            }
            Ok(BatchOperationSummary::from_results(results))
        }

        async fn count_documents(&self, index: &str) -> Result<u64, SearchIndexError> {
            self.check()?;
            Ok(self
                .documents
                .lock()
                .unwrap()
                .keys()
                .filter(|(i, _)| i == index)
                .count() as u64)
        }
    }

    async fn connected_store() -> (Arc<MockProvider>, SearchIndexStore) {
        let provider = Arc::new(MockProvider::default());
        let store = SearchIndexStore::new(provider.clone());
        assert!(store.connect().await);
        (provider, store)
    }

    #[tokio::test]
    async fn test_connect_failure_degrades_instead_of_failing() {
        let provider = Arc::new(MockProvider::default());
        provider.down.store(true, Ordering::SeqCst);
        let store = SearchIndexStore::new(provider.clone());

        assert!(!store.connect().await);
        assert!(!store.is_ready());

        let outcome = store.upsert("users", "u1", &json!({ "id": "u1" })).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(provider.write_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upsert_then_partial_update_merges() {
        let (provider, store) = connected_store().await;

        store
            .upsert("users", "u1", &json!({ "id": "u1", "email": "a@x.com" }))
            .await
            .unwrap();
        let outcome = store
            .update("users", "u1", &json!({ "firstName": "Jo" }))
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Applied);
        assert_eq!(
            provider.doc("users", "u1").unwrap(),
            json!({ "id": "u1", "email": "a@x.com", "firstName": "Jo" })
        );
    }

    #[tokio::test]
    async fn test_connection_error_during_write_is_skipped_and_degrades() {
        let (provider, store) = connected_store().await;
        provider.down.store(true, Ordering::SeqCst);

        let outcome = store.delete("roles", "r1").await.unwrap();

        assert_eq!(outcome, WriteOutcome::Skipped);
        assert!(!store.is_ready());
    }

    #[tokio::test]
    async fn test_non_connection_error_propagates() {
        let (provider, store) = connected_store().await;
        provider.reject_writes.store(true, Ordering::SeqCst);

        let result = store.upsert("users", "u1", &json!({ "id": "u1" })).await;

        assert!(matches!(result, Err(SearchIndexError::IndexError(_))));
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected() {
        let (_, store) = connected_store().await;
        let result = store.update("users", "", &json!({})).await;
        assert!(matches!(result, Err(SearchIndexError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_ensure_index_is_idempotent() {
        let (provider, store) = connected_store().await;
        let definition = IndexDefinition::new("users", json!({ "id": { "type": "keyword" } }));

        store.ensure_index(&definition).await.unwrap();
        store.ensure_index(&definition).await.unwrap();

        assert_eq!(provider.created_indices.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_recreates_registered_indices() {
        let provider = Arc::new(MockProvider::default());
        provider.down.store(true, Ordering::SeqCst);
        let store = SearchIndexStore::new(provider.clone());
        store.connect().await;

        let definition = IndexDefinition::new("roles", json!({}));
        assert_eq!(
            store.ensure_index(&definition).await.unwrap(),
            WriteOutcome::Skipped
        );
        assert!(provider.created_indices.lock().unwrap().is_empty());

        provider.down.store(false, Ordering::SeqCst);
        assert!(store.refresh().await);
        assert_eq!(*provider.created_indices.lock().unwrap(), vec!["roles".to_string()]);
    }

    #[tokio::test]
    async fn test_count_missing_index_is_zero() {
        let (_, store) = connected_store().await;
        assert_eq!(store.count("permissions").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_when_degraded_is_an_error() {
        let provider = Arc::new(MockProvider::default());
        let store = SearchIndexStore::new(provider);
        assert!(store.count("users").await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_bulk_upsert() {
        let (provider, store) = connected_store().await;
        let documents = vec![
            IndexDocument::new("p1", json!({ "id": "p1" })),
            IndexDocument::new("p2", json!({ "id": "p2" })),
        ];

        let summary = store.bulk_upsert("permissions", &documents).await.unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(store.count("permissions").await.unwrap(), 2);
        assert!(provider.doc("permissions", "p2").is_some());
    }

    #[tokio::test]
    async fn test_bulk_upsert_batch_limit() {
        let provider = Arc::new(MockProvider::default());
        let store =
            SearchIndexStore::with_config(provider, SearchIndexStoreConfig::with_max_batch_size(1));
        store.connect().await;

        let documents = vec![
            IndexDocument::new("a", json!({})),
            IndexDocument::new("b", json!({})),
        ];
        let result = store.bulk_upsert("users", &documents).await;

        assert!(matches!(
            result,
            Err(SearchIndexError::BatchSizeExceeded { provided: 2, max: 1 })
        ));
    }

    #[tokio::test]
    async fn test_closed_store_stays_degraded() {
        let (_, store) = connected_store().await;
        store.close();

        assert!(!store.refresh().await);
        assert_eq!(
            store.delete("users", "u1").await.unwrap(),
            WriteOutcome::Skipped
        );
    }
}
