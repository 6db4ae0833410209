//! # Searcher Repository
//!
//! This crate provides the traits and implementations for interacting with
//! the search index. It includes the error type, the provider interface, an
//! OpenSearch implementation, and `SearchIndexStore`, the operational
//! wrapper that keeps indexing alive in a degraded mode when the search
//! engine is unreachable.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod store;
pub mod types;
pub mod utils;

pub use config::{SearchIndexConfig, SearchIndexStoreConfig};
pub use errors::SearchIndexError;
pub use interfaces::SearchIndexProvider;
pub use opensearch::{IndexDefinition, OpenSearchProvider};
pub use store::SearchIndexStore;
pub use types::{BatchOperationResult, BatchOperationSummary, IndexDocument, WriteOutcome};
pub use utils::validate_document_id;
