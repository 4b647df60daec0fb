//! OpenSearch backend implementation.
//!
//! This module provides the concrete implementation of `SearchBackend`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    http::response::Response,
    indices::{IndicesCreateParts, IndicesDeleteParts, IndicesRefreshParts},
    BulkParts, DeleteByQueryParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::BackendConfig;
use crate::errors::BackendError;
use crate::interfaces::SearchBackend;
use crate::opensearch::bulk;
use crate::opensearch::index_config::IndexSchemas;
use crate::types::{BulkItemStatus, BulkLine};

/// OpenSearch backend.
///
/// Sends bulk requests to the `_bulk` endpoint and performs the index
/// administration needed by mass indexing.
///
/// # Example
///
/// ```ignore
/// let config = BackendConfig::new("http://localhost:9200");
/// let backend = OpenSearchBackend::new(&config, IndexSchemas::new()).await?;
///
/// let line = BulkLine::try_from(&Work::add_or_update("books", "1", json!({ "title": "Dune" })))?;
/// let statuses = backend.bulk(&[line]).await?;
/// ```
pub struct OpenSearchBackend {
    client: OpenSearch,
    schemas: IndexSchemas,
}

impl OpenSearchBackend {
    /// Create a new OpenSearch backend connected to the configured URL.
    ///
    /// # Arguments
    ///
    /// * `config` - URL and request timeout
    /// * `schemas` - Creation bodies used by `drop_and_create_index`
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchBackend)` - A new backend instance
    /// * `Err(BackendError)` - If connection setup fails
    pub async fn new(config: &BackendConfig, schemas: IndexSchemas) -> Result<Self, BackendError> {
        let parsed_url =
            Url::parse(&config.url).map_err(|e| BackendError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let transport = builder
            .build()
            .map_err(|e| BackendError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %config.url, "Created OpenSearch backend");

        Ok(Self { client, schemas })
    }

    /// Turn a non-success administration response into an error.
    ///
    /// `allow_not_found` accepts a 404 (deleting a missing index).
    async fn check_admin_response(
        index: &str,
        operation: &str,
        response: Response,
        allow_not_found: bool,
    ) -> Result<(), BackendError> {
        let status = response.status_code();
        if status.is_success() || (allow_not_found && status.as_u16() == 404) {
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        error!(
            index = %index,
            operation = %operation,
            status = %status,
            body = %error_body,
            "Index administration request failed"
        );
        Err(BackendError::index_admin(
            index,
            format!("{} failed with status {}: {}", operation, status, error_body),
        ))
    }
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    /// Send the lines as one `_bulk` request.
    ///
    /// A non-success HTTP status for the whole request is returned as
    /// `BackendError::StatusError`; item-level failures are returned in the
    /// statuses.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    async fn bulk(&self, lines: &[BulkLine]) -> Result<Vec<BulkItemStatus>, BackendError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let body = bulk::build_body(lines);

        let response = self.client.bulk(BulkParts::None).body(body).send().await?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(BackendError::status(status.as_u16(), error_body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::parse(e.to_string()))?;

        let items = bulk::parse_response(body)?;
        debug!(item_count = items.len(), "Bulk request completed");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn drop_and_create_index(&self, index: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await?;
        Self::check_admin_response(index, "delete index", response, true).await?;

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(self.schemas.creation_body(index))
            .send()
            .await?;
        Self::check_admin_response(index, "create index", response, false).await?;

        info!(index = %index, "Index dropped and recreated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_index(&self, index: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .body(json!({ "query": { "match_all": {} } }))
            .send()
            .await?;
        Self::check_admin_response(index, "purge", response, false).await?;

        info!(index = %index, "Index purged");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn refresh_index(&self, index: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await?;
        Self::check_admin_response(index, "refresh", response, false).await?;

        debug!(index = %index, "Index refreshed");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Ok(false);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::parse(e.to_string()))?;

        let cluster_status = body["status"].as_str().unwrap_or("red");
        debug!(status = %cluster_status, "Cluster health");
        Ok(cluster_status != "red")
    }
}
