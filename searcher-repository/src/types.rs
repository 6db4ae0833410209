//! Request and response types for search index operations.

use serde::Serialize;
use serde_json::Value;

use crate::errors::SearchIndexError;

/// Result of a write issued through `SearchIndexStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    /// The search engine accepted the write.
    Applied,
    /// The store is degraded and the write was not attempted.
    Skipped,
}

impl WriteOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, WriteOutcome::Skipped)
    }
}

/// A document to be written, identified by its document id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    /// The document id (the domain entity's id).
    pub id: String,
    /// The document body.
    pub body: Value,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

/// Result of a batch operation for a single document.
#[derive(Debug, Clone)]
pub struct BatchOperationResult {
    /// The document id.
    pub id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error if the operation failed.
    pub error: Option<SearchIndexError>,
}

/// Summary of a batch operation containing aggregate statistics and individual results.
///
/// Allows callers to handle partial failures: a bulk request can be accepted
/// by the engine while individual items are rejected.
#[derive(Debug, Clone, Default)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
    /// Set when the batch was not sent because the store is degraded.
    pub skipped: bool,
}

impl BatchOperationSummary {
    /// Summary for a batch that was not sent.
    pub fn skipped(total: usize) -> Self {
        Self {
            total,
            skipped: true,
            ..Default::default()
        }
    }

    /// Build a summary from per-item results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            skipped: false,
        }
    }
}
