//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, CountParts, DeleteParts, IndexParts, OpenSearch, UpdateParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::config::SearchIndexConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{BatchOperationResult, BatchOperationSummary, IndexDocument};

/// OpenSearch provider implementation.
///
/// # Example
///
/// ```ignore
/// use searcher_repository::{OpenSearchProvider, SearchIndexConfig, SearchIndexProvider};
///
/// let config = SearchIndexConfig::new("http://localhost:9200");
/// let provider = OpenSearchProvider::new(&config)?;
///
/// provider
///     .update_document("users", "u1", &serde_json::json!({ "firstName": "Jo" }))
///     .await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider for the configured URL.
    ///
    /// No request is sent; connectivity is checked with [`SearchIndexProvider::ping`].
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If the URL is invalid or the transport cannot be built
    pub fn new(config: &SearchIndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(&config.url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.request_timeout);

        if let Some((username, password)) = config.credentials() {
            builder = builder.auth(Credentials::Basic(
                username.to_string(),
                password.to_string(),
            ));
        }

        let transport = builder
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        info!(
            url = %config.url,
            authenticated = config.credentials().is_some(),
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }

    /// Turn a non-success response into an error built by `make_error`.
    async fn check_response(
        response: Response,
        operation: &str,
        make_error: fn(String) -> SearchIndexError,
    ) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %error_body, operation = operation, "Request failed");
        Err(make_error(format!(
            "{} failed with status {}: {}",
            operation, status, error_body
        )))
    }

    /// Extract per-item results from a bulk response body.
    fn parse_bulk_response(
        body: &Value,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        let items = body["items"]
            .as_array()
            .ok_or_else(|| SearchIndexError::parse("Bulk response has no items array"))?;

        let results = items
            .iter()
            .zip(documents)
            .map(|(item, document)| {
                let outcome = &item["index"];
                let status = outcome["status"].as_u64().unwrap_or(0);
                if (200..300).contains(&status) {
                    BatchOperationResult {
                        id: document.id.clone(),
                        success: true,
                        error: None,
                    }
                } else {
                    BatchOperationResult {
                        id: document.id.clone(),
                        success: false,
                        error: Some(SearchIndexError::index(format!(
                            "status {}: {}",
                            status, outcome["error"]
                        ))),
                    }
                }
            })
            .collect::<Vec<_>>();

        if results.len() != documents.len() {
            return Err(SearchIndexError::parse(format!(
                "Bulk response has {} items for {} documents",
                results.len(),
                documents.len()
            )));
        }

        Ok(BatchOperationSummary::from_results(results))
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    async fn ping(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(SearchIndexError::connection(format!(
                "Ping returned status {}",
                response.status_code()
            )));
        }
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SearchIndexError::index_creation(format!(
                "Index existence check for '{}' returned status {}",
                index, status
            ))),
        }
    }

    async fn create_index(&self, index: &str, definition: &Value) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(definition.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %index, "Created index");
            return Ok(());
        }

        // Another instance may have created the index between the existence check and now
        let error_body = response.text().await.unwrap_or_default();
        if status.as_u16() == 400 && error_body.contains("resource_already_exists_exception") {
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        error!(status = %status, body = %error_body, index = %index, "Index creation failed");
        Err(SearchIndexError::index_creation(format!(
            "Creating index '{}' failed with status {}: {}",
            index, status, error_body
        )))
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
    ) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(document.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::check_response(response, "Index", SearchIndexError::IndexError).await?;

        debug!(index = %index, doc_id = %id, "Document indexed");
        Ok(())
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: &Value,
    ) -> Result<(), SearchIndexError> {
        // API reference: https://docs.opensearch.org/latest/api-reference/document-apis/update-document/#using-the-upsert-operation
        let response = self
            .client
            .update(UpdateParts::IndexId(index, id))
            .body(json!({
                "doc": partial,
                "doc_as_upsert": true
            }))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::check_response(response, "Update", SearchIndexError::UpdateError).await?;

        debug!(index = %index, doc_id = %id, "Document updated/created");
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        // 404 is acceptable - document may not exist
        if response.status_code().as_u16() == 404 {
            debug!(index = %index, doc_id = %id, "Document to delete not found");
            return Ok(());
        }

        Self::check_response(response, "Delete", SearchIndexError::DeleteError).await?;

        debug!(index = %index, doc_id = %id, "Document deleted");
        Ok(())
    }

    async fn bulk_index_documents(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if documents.is_empty() {
            return Ok(BatchOperationSummary::default());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for document in documents {
            body.push(json!({ "index": { "_id": document.id } }).into());
            body.push(document.body.clone().into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response =
            Self::check_response(response, "Bulk index", SearchIndexError::BulkIndexError).await?;

        let response_body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let summary = Self::parse_bulk_response(&response_body, documents)?;
        debug!(
            index = %index,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Bulk index completed"
        );
        Ok(summary)
    }

    async fn count_documents(&self, index: &str) -> Result<u64, SearchIndexError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(0);
        }

        let response = Self::check_response(response, "Count", SearchIndexError::CountError).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        body["count"]
            .as_u64()
            .ok_or_else(|| SearchIndexError::parse(format!("Count response has no count: {}", body)))
    }
}
