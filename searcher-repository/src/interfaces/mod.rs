//! Interface definitions for the search index provider.
//!
//! This module defines the abstract `SearchIndexProvider` trait that allows
//! for swappable search backend implementations and mock providers in tests.

mod search_index_provider;

pub use search_index_provider::SearchIndexProvider;
