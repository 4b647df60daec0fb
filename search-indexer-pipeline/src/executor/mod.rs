//! Bulk execution: sends a [`BulkRequest`] to the backend and resolves the
//! handle of every work it carries.
//!
//! Transport failures are retried with exponential backoff. A request that
//! still fails resolves all of its works with the same failure; otherwise the
//! response items are matched to the works by position.

mod retry;

use std::sync::Arc;

use search_indexer_repository::{BulkItemStatus, BulkLine, SearchBackend};
use search_indexer_shared::{Work, WorkOperation};
use tracing::{debug, error, info, instrument, warn};

use crate::batcher::BulkRequest;
use crate::changeset::{report_for, Completion, QueuedWork, WorkResult};
use crate::errors::WorkError;

pub use retry::RetryPolicy;

/// Counters describing how the works of one request were resolved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkExecutionSummary {
    /// Works included in the request sent to the backend.
    pub sent: usize,
    /// Works applied successfully.
    pub succeeded: usize,
    /// Works that failed.
    pub failed: usize,
    /// Works skipped because an earlier work of their changeset failed.
    pub skipped: usize,
}

impl BulkExecutionSummary {
    fn record(&mut self, completion: Completion) {
        match completion {
            Completion::Succeeded => self.succeeded += 1,
            Completion::Failed => self.failed += 1,
            Completion::Skipped => self.skipped += 1,
        }
    }
}

/// Sends bulk requests and demultiplexes their responses.
pub struct BulkExecutor {
    backend: Arc<dyn SearchBackend>,
    retry: RetryPolicy,
}

impl BulkExecutor {
    /// Create an executor for the given backend.
    pub fn new(backend: Arc<dyn SearchBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Execute a request and resolve every work it contains.
    ///
    /// Works whose changeset already failed at an earlier position are
    /// skipped without being sent.
    #[instrument(skip_all, fields(works = request.len(), bytes = request.estimated_bytes()))]
    pub async fn execute(&self, request: BulkRequest) -> BulkExecutionSummary {
        let mut summary = BulkExecutionSummary::default();
        let mut works = Vec::with_capacity(request.len());
        let mut lines = Vec::with_capacity(request.len());

        for queued in request.works {
            let Some(queued) = queued.skip_if_preceded_by_failure() else {
                summary.skipped += 1;
                continue;
            };
            match BulkLine::try_from(queued.work()) {
                Ok(line) => {
                    lines.push(line);
                    works.push(queued);
                }
                Err(e) => {
                    let document = queued.work().document();
                    warn!(
                        changeset_id = %queued.changeset_id(),
                        document = %document,
                        error = %e,
                        "Dropping invalid work"
                    );
                    summary.record(queued.complete(Err(WorkError::invalid(document, e.to_string()))));
                }
            }
        }

        if lines.is_empty() {
            return summary;
        }
        summary.sent = lines.len();

        match self.send(&lines).await {
            Ok(statuses) => self.demultiplex(works, statuses, &mut summary),
            Err(error) => {
                summary.failed += works.len();
                for queued in works {
                    queued.fail(error.clone());
                }
            }
        }

        if summary.failed > 0 || summary.skipped > 0 {
            warn!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Bulk request completed with failures"
            );
        } else {
            debug!(succeeded = summary.succeeded, "Bulk request completed");
        }
        summary
    }

    /// Send the lines, retrying transport failures with exponential backoff.
    async fn send(&self, lines: &[BulkLine]) -> Result<Vec<BulkItemStatus>, WorkError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.backend.bulk(lines).await {
                Ok(statuses) => {
                    if attempt > 1 {
                        info!(attempt, count = lines.len(), "Bulk request succeeded after retry");
                    }
                    return Ok(statuses);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        error!(error = %e, count = lines.len(), "Bulk request failed with non-retryable error");
                        return Err(WorkError::request_failed(attempt, e.to_string()));
                    }
                    if attempt > self.retry.max_retries {
                        error!(
                            error = %e,
                            attempts = attempt,
                            count = lines.len(),
                            "Bulk request failed after retries"
                        );
                        return Err(WorkError::request_failed(attempt, e.to_string()));
                    }

                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Bulk request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Match response items to works by position and resolve each handle.
    fn demultiplex(
        &self,
        works: Vec<QueuedWork>,
        statuses: Vec<BulkItemStatus>,
        summary: &mut BulkExecutionSummary,
    ) {
        if statuses.len() != works.len() {
            warn!(
                expected = works.len(),
                received = statuses.len(),
                "Bulk response item count does not match request"
            );
        }

        let mut statuses = statuses.into_iter();
        for queued in works {
            let result = match statuses.next() {
                Some(status) => item_result(queued.work(), status),
                None => Err(WorkError::MissingResponseItem {
                    document: queued.work().document(),
                }),
            };
            summary.record(queued.complete(result));
        }
    }
}

/// Interpret one bulk item. Deleting a document that does not exist counts
/// as a success.
fn item_result(work: &Work, item: BulkItemStatus) -> WorkResult {
    let missing_on_delete = work.operation == WorkOperation::Delete && item.status == 404;
    if item.is_success() || missing_on_delete {
        return Ok(report_for(work, item.status, item.result));
    }

    let (error_type, reason) = match item.error {
        Some(error) => (Some(error.error_type), error.reason),
        None => (None, format!("unexpected status {}", item.status)),
    };
    Err(WorkError::Rejected {
        document: work.document(),
        status: item.status,
        error_type,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::{Batcher, BatcherConfig};
    use crate::changeset::{Changeset, WorkHandle};
    use async_trait::async_trait;
    use search_indexer_repository::BackendError;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend answering with scripted responses.
    struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<Vec<BulkItemStatus>, BackendError>>>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<Vec<BulkItemStatus>, BackendError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn bulk(&self, lines: &[BulkLine]) -> Result<Vec<BulkItemStatus>, BackendError> {
            self.calls.lock().unwrap().push(lines.len());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::connection("no scripted response")))
        }

        async fn drop_and_create_index(&self, _index: &str) -> Result<(), BackendError> {
            Ok(())
        }

        async fn purge_index(&self, _index: &str) -> Result<(), BackendError> {
            Ok(())
        }

        async fn refresh_index(&self, _index: &str) -> Result<(), BackendError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<bool, BackendError> {
            Ok(true)
        }
    }

    fn request(works: Vec<Work>) -> (BulkRequest, Vec<WorkHandle>) {
        let mut changeset = Changeset::new();
        let handles = works.into_iter().map(|w| changeset.add(w)).collect();
        let mut batcher = Batcher::new(BatcherConfig::default());
        for queued in changeset.into_submission().1 {
            assert!(batcher.push(queued).is_none());
        }
        (batcher.flush().unwrap(), handles)
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_fails_every_work() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(BackendError::connection("refused")),
            Err(BackendError::status(503, "unavailable")),
            Err(BackendError::connection("refused")),
        ]));
        let executor = BulkExecutor::new(backend.clone(), fast_retry(2));
        let (request, handles) = request(
            (0..4)
                .map(|i| Work::add("books", i.to_string(), json!({ "n": i })))
                .collect(),
        );

        let summary = executor.execute(request).await;

        assert_eq!(summary.failed, 4);
        assert_eq!(backend.calls(), vec![4, 4, 4]);
        for handle in handles {
            assert!(matches!(
                handle.wait().await,
                Err(WorkError::RequestFailed { attempts: 3, .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(BackendError::status(
            400, "bad request",
        ))]));
        let executor = BulkExecutor::new(backend.clone(), fast_retry(5));
        let (request, handles) = request(vec![Work::delete("books", "1")]);

        executor.execute(request).await;

        assert_eq!(backend.calls(), vec![1]);
        let result = handles.into_iter().next().unwrap().wait().await;
        assert!(matches!(result, Err(WorkError::RequestFailed { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn test_item_failure_skips_rest_of_changeset() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
            BulkItemStatus::success(201, "created"),
            BulkItemStatus::success(201, "created"),
            BulkItemStatus::failure(409, "version_conflict_engine_exception", "conflict"),
            BulkItemStatus::success(201, "created"),
            BulkItemStatus::success(201, "created"),
        ])]));
        let executor = BulkExecutor::new(backend, RetryPolicy::none());
        let (request, handles) = request(
            (1..=5)
                .map(|i| Work::add("books", i.to_string(), json!({ "n": i })))
                .collect(),
        );

        let summary = executor.execute(request).await;

        assert_eq!(
            summary,
            BulkExecutionSummary {
                sent: 5,
                succeeded: 2,
                failed: 1,
                skipped: 2
            }
        );
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.wait().await);
        }
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(matches!(
            &results[2],
            Err(WorkError::Rejected { status: 409, error_type: Some(t), .. }) if t == "version_conflict_engine_exception"
        ));
        assert!(results[3..].iter().all(|r| matches!(r, Err(e) if e.is_skip())));
    }

    #[tokio::test]
    async fn test_missing_document_on_delete_is_success() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![BulkItemStatus {
            status: 404,
            result: Some("not_found".to_string()),
            error: None,
        }])]));
        let executor = BulkExecutor::new(backend, RetryPolicy::none());
        let (request, handles) = request(vec![Work::delete("books", "gone")]);

        executor.execute(request).await;

        let report = handles.into_iter().next().unwrap().wait().await.unwrap();
        assert_eq!(report.status, 404);
        assert_eq!(report.result.as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_short_response_resolves_missing_items() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![BulkItemStatus::success(
            200, "updated",
        )])]));
        let executor = BulkExecutor::new(backend, RetryPolicy::none());
        let (request, handles) = request(vec![
            Work::update("books", "1", json!({ "t": 1 })),
            Work::update("books", "2", json!({ "t": 2 })),
        ]);

        executor.execute(request).await;

        let mut handles = handles.into_iter();
        assert!(handles.next().unwrap().wait().await.is_ok());
        assert!(matches!(
            handles.next().unwrap().wait().await,
            Err(WorkError::MissingResponseItem { .. })
        ));
    }

    #[tokio::test]
    async fn test_work_without_payload_is_rejected_before_sending() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let executor = BulkExecutor::new(backend.clone(), RetryPolicy::none());
        let mut broken = Work::add("books", "1", json!({}));
        broken.payload = None;
        let (request, handles) = request(vec![broken]);

        let summary = executor.execute(request).await;

        assert_eq!(summary.failed, 1);
        assert!(backend.calls().is_empty());
        assert!(matches!(
            handles.into_iter().next().unwrap().wait().await,
            Err(WorkError::InvalidWork { .. })
        ));
    }
}
