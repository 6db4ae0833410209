//! OpenSearch implementation of the search index provider.
//!
//! This module provides a concrete implementation of `SearchIndexProvider`
//! using OpenSearch as the backend, plus the index definitions it creates.

mod index_config;
mod provider;

pub use index_config::IndexDefinition;
pub use provider::OpenSearchProvider;
