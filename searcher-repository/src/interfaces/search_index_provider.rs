//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch, etc.).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{BatchOperationSummary, IndexDocument};

/// Abstracts the underlying search engine.
///
/// Implementations are wrapped by `SearchIndexStore`, which owns the
/// connectivity state and the degraded-mode policy. Providers report
/// transport failures as `SearchIndexError::ConnectionError` and any other
/// rejection with the operation-specific variant.
///
/// Document identity is always the caller-supplied id, so every write is an
/// idempotent overwrite of the same document.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Check that the search engine answers.
    async fn ping(&self) -> Result<(), SearchIndexError>;

    /// Whether the named index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError>;

    /// Create an index with the given settings and mappings.
    ///
    /// Creating an index that already exists is not an error.
    async fn create_index(&self, index: &str, definition: &Value) -> Result<(), SearchIndexError>;

    /// Write a full document, replacing any existing document with the same id.
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
    ) -> Result<(), SearchIndexError>;

    /// Merge a partial document into an existing one, creating it if absent.
    ///
    /// Fields missing from `partial` are left unchanged.
    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: &Value,
    ) -> Result<(), SearchIndexError>;

    /// Delete a document. Deleting a document that does not exist succeeds.
    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError>;

    /// Write many full documents in a single request.
    ///
    /// Returns a per-document summary; an error is returned only when the
    /// request as a whole fails.
    async fn bulk_index_documents(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Number of documents in the index, or 0 if the index does not exist.
    async fn count_documents(&self, index: &str) -> Result<u64, SearchIndexError>;
}
