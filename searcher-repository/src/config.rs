//! Configuration types for the search index store and its OpenSearch client.

use std::time::Duration;

/// Connection settings for the OpenSearch client.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Search engine URL (e.g. "http://localhost:9200").
    pub url: String,
    /// Optional basic-auth username.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
    /// Per-request timeout applied by the HTTP transport.
    pub request_timeout: Duration,
}

impl SearchIndexConfig {
    /// Create a config for an unauthenticated engine with a 30s request timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Credentials, if both username and password are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Configuration for the `SearchIndexStore`.
///
/// Controls batch operation limits so that a bulk upsert cannot send an
/// unbounded request to the search engine.
#[derive(Debug, Clone)]
pub struct SearchIndexStoreConfig {
    /// Maximum number of documents allowed in a single bulk operation.
    ///
    /// Set to `None` to disable the limit (not recommended for production).
    pub max_batch_size: Option<usize>,
}

impl Default for SearchIndexStoreConfig {
    fn default() -> Self {
        Self {
            max_batch_size: Some(1000),
        }
    }
}

impl SearchIndexStoreConfig {
    /// Create a config with no batch size limit.
    pub fn unlimited() -> Self {
        Self {
            max_batch_size: None,
        }
    }

    /// Create a config with a custom batch size limit.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: Some(max_batch_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_require_both_parts() {
        let config = SearchIndexConfig::new("http://localhost:9200");
        assert!(config.credentials().is_none());

        let config = config.with_credentials("admin".to_string(), "secret".to_string());
        assert_eq!(config.credentials(), Some(("admin", "secret")));
    }

    #[test]
    fn test_store_config_defaults() {
        assert_eq!(SearchIndexStoreConfig::default().max_batch_size, Some(1000));
        assert_eq!(SearchIndexStoreConfig::unlimited().max_batch_size, None);
        assert_eq!(
            SearchIndexStoreConfig::with_max_batch_size(10).max_batch_size,
            Some(10)
        );
    }
}
