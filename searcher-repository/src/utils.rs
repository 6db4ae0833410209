//! Utility functions for the searcher repository.

use crate::errors::SearchIndexError;

/// Maximum length OpenSearch accepts for a document `_id`, in bytes.
const MAX_DOCUMENT_ID_BYTES: usize = 512;

/// Validate a document id before it is used in a request path.
///
/// # Arguments
///
/// * `id` - The document id (the domain entity's id)
///
/// # Returns
///
/// * `Ok(())` - If the id is usable
/// * `Err(SearchIndexError)` - If the id is empty, blank or too long
///
/// # Example
///
/// ```
/// use searcher_repository::validate_document_id;
///
/// assert!(validate_document_id("u1").is_ok());
/// assert!(validate_document_id("  ").is_err());
/// ```
pub fn validate_document_id(id: &str) -> Result<(), SearchIndexError> {
    if id.trim().is_empty() {
        return Err(SearchIndexError::validation("Document id cannot be empty"));
    }
    if id.len() > MAX_DOCUMENT_ID_BYTES {
        return Err(SearchIndexError::validation(format!(
            "Document id is {} bytes, maximum is {}",
            id.len(),
            MAX_DOCUMENT_ID_BYTES
        )));
    }
    Ok(())
}
