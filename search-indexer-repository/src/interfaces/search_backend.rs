//! Search backend trait definition.
//!
//! This module defines the abstract interface for bulk writes and index
//! administration, allowing for different backend implementations
//! (OpenSearch, Elasticsearch, test doubles).

use async_trait::async_trait;

use crate::errors::BackendError;
use crate::types::{BulkItemStatus, BulkLine};

/// Abstract interface for the search backend.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// A returned `Err` means the request as a whole failed (transport error,
/// non-success HTTP status, unreadable response). Per-item failures are
/// reported inside the `Ok` value.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Send one bulk request.
    ///
    /// # Arguments
    ///
    /// * `lines` - The bulk lines, in the order they must be applied
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<BulkItemStatus>)` - One status per line, in request order
    /// * `Err(BackendError)` - If the request failed as a whole
    async fn bulk(&self, lines: &[BulkLine]) -> Result<Vec<BulkItemStatus>, BackendError>;

    /// Delete the index if it exists and create it again with its registered schema.
    async fn drop_and_create_index(&self, index: &str) -> Result<(), BackendError>;

    /// Remove every document from the index, keeping its schema.
    async fn purge_index(&self, index: &str) -> Result<(), BackendError>;

    /// Make recent writes to the index visible to searches.
    async fn refresh_index(&self, index: &str) -> Result<(), BackendError>;

    /// Check if the backend is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the backend is healthy
    /// * `Ok(false)` - If the backend is unhealthy
    /// * `Err(BackendError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, BackendError>;
}
