//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use search_indexer_pipeline::{OrchestratorConfig, RetryPolicy};
use search_indexer_repository::{BackendError, BulkItemStatus, BulkLine, SearchBackend};
use tokio::sync::Mutex;

/// Backend recording every call and answering success unless told otherwise.
#[derive(Default)]
pub struct RecordingBackend {
    /// Every bulk request, as the lines it carried.
    pub requests: Mutex<Vec<Vec<BulkLine>>>,
    /// Index administration calls, as `"<action>:<index>"`.
    pub admin_calls: Mutex<Vec<String>>,
    /// Documents rejected by id, with the status to report.
    pub rejected: Mutex<HashMap<String, u16>>,
    /// Transport failures returned before any bulk call succeeds.
    pub transport_failures: Mutex<VecDeque<BackendError>>,
    bulk_calls: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reject(&self, id: &str, status: u16) {
        self.rejected.lock().await.insert(id.to_string(), status);
    }

    pub async fn fail_next_requests(&self, errors: Vec<BackendError>) {
        self.transport_failures.lock().await.extend(errors);
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Sizes of the bulk requests that reached the backend.
    pub async fn request_sizes(&self) -> Vec<usize> {
        self.requests.lock().await.iter().map(Vec::len).collect()
    }

    /// Ids of every line received, in arrival order.
    pub async fn received_ids(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .flatten()
            .map(|line| line.id.clone())
            .collect()
    }
}

#[async_trait]
impl SearchBackend for RecordingBackend {
    async fn bulk(&self, lines: &[BulkLine]) -> Result<Vec<BulkItemStatus>, BackendError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.transport_failures.lock().await.pop_front() {
            return Err(error);
        }

        self.requests.lock().await.push(lines.to_vec());
        let rejected = self.rejected.lock().await;
        Ok(lines
            .iter()
            .map(|line| match rejected.get(&line.id) {
                Some(status) => BulkItemStatus::failure(*status, "mapper_parsing_exception", "rejected by test"),
                None => BulkItemStatus::success(201, "created"),
            })
            .collect())
    }

    async fn drop_and_create_index(&self, index: &str) -> Result<(), BackendError> {
        self.admin_calls.lock().await.push(format!("drop_and_create:{index}"));
        Ok(())
    }

    async fn purge_index(&self, index: &str) -> Result<(), BackendError> {
        self.admin_calls.lock().await.push(format!("purge:{index}"));
        Ok(())
    }

    async fn refresh_index(&self, index: &str) -> Result<(), BackendError> {
        self.admin_calls.lock().await.push(format!("refresh:{index}"));
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(true)
    }
}

/// Orchestrator configuration with millisecond retry delays.
pub fn fast_config(queue_count: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        queue_count,
        retry: RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        ..OrchestratorConfig::default()
    }
}
