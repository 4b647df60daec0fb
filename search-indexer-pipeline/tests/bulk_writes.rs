//! Bulk execution through the orchestrator: retries, per-item failures and
//! the skip rule.

mod common;

use std::sync::Arc;
use std::time::Duration;

use search_indexer_pipeline::{
    BatcherConfig, Changeset, Orchestrator, OrchestratorState, WorkError,
};
use search_indexer_repository::BackendError;
use search_indexer_shared::Work;
use serde_json::json;

use common::{fast_config, RecordingBackend};

fn book(id: u32) -> Work {
    Work::add_or_update("books", id.to_string(), json!({ "title": format!("Book {id}") }))
}

#[tokio::test]
async fn transport_failure_fails_every_work_of_the_request() {
    let backend = Arc::new(RecordingBackend::new());
    backend
        .fail_next_requests(vec![
            BackendError::connection("refused"),
            BackendError::timeout("no answer"),
            BackendError::status(503, "unavailable"),
        ])
        .await;
    let orchestrator = Orchestrator::with_config("writes", backend.clone(), fast_config(1));

    let mut changeset = Changeset::new();
    let handles: Vec<_> = (1..=6).map(|id| changeset.add(book(id))).collect();
    let completion = orchestrator.submit(changeset).await.unwrap();

    for handle in handles {
        let error = handle.wait().await.unwrap_err();
        assert!(
            matches!(error, WorkError::RequestFailed { attempts: 3, .. }),
            "unexpected error: {error}"
        );
    }
    assert!(matches!(
        completion.wait().await,
        Err(WorkError::RequestFailed { .. })
    ));
    assert_eq!(backend.bulk_calls(), 3);
    assert!(backend.requests.lock().await.is_empty());
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let backend = Arc::new(RecordingBackend::new());
    backend
        .fail_next_requests(vec![BackendError::status(429, "too many requests")])
        .await;
    let orchestrator = Orchestrator::with_config("writes", backend.clone(), fast_config(1));

    let mut changeset = Changeset::new();
    let handles: Vec<_> = (1..=3).map(|id| changeset.add(book(id))).collect();
    orchestrator.submit(changeset).await.unwrap().wait().await.unwrap();

    for handle in handles {
        let report = handle.wait().await.unwrap();
        assert_eq!(report.status, 201);
    }
    assert_eq!(backend.bulk_calls(), 2);
}

#[tokio::test]
async fn failed_work_skips_the_rest_of_its_changeset() {
    let backend = Arc::new(RecordingBackend::new());
    backend.reject("3", 400).await;
    let orchestrator = Orchestrator::with_config("writes", backend.clone(), fast_config(1));

    let mut changeset = Changeset::new();
    let handles: Vec<_> = (1..=5).map(|id| changeset.add(book(id))).collect();
    let completion = orchestrator.submit(changeset).await.unwrap();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.wait().await);
    }

    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(matches!(
        &results[2],
        Err(WorkError::Rejected { status: 400, .. })
    ));
    for skipped in &results[3..] {
        let error = skipped.as_ref().unwrap_err();
        assert!(error.is_skip(), "unexpected error: {error}");
        assert!(matches!(error.root_cause(), WorkError::Rejected { .. }));
    }
    assert!(matches!(
        completion.wait().await,
        Err(WorkError::Rejected { status: 400, .. })
    ));
}

#[tokio::test]
async fn works_after_a_failure_are_not_sent() {
    let backend = Arc::new(RecordingBackend::new());
    backend.reject("2", 409).await;
    let mut config = fast_config(1);
    config.batcher = BatcherConfig {
        max_bulk_actions: 2,
        ..BatcherConfig::default()
    };
    let orchestrator = Orchestrator::with_config("writes", backend.clone(), config);

    let mut changeset = Changeset::new();
    let handles: Vec<_> = (1..=4).map(|id| changeset.add(book(id))).collect();
    orchestrator.submit(changeset).await.unwrap();

    for handle in handles {
        let _ = handle.wait().await;
    }

    assert_eq!(backend.received_ids().await, vec!["1", "2"]);
}

#[tokio::test]
async fn failure_does_not_leak_into_other_changesets() {
    let backend = Arc::new(RecordingBackend::new());
    backend.reject("1", 400).await;
    let orchestrator = Orchestrator::with_config("writes", backend.clone(), fast_config(1));

    let mut failing = Changeset::new();
    let failing_handle = failing.add(book(1));
    let mut healthy = Changeset::new();
    let healthy_handle = healthy.add(book(2));

    orchestrator.submit(failing).await.unwrap();
    orchestrator.submit(healthy).await.unwrap();

    assert!(failing_handle.wait().await.is_err());
    assert!(healthy_handle.wait().await.is_ok());
}

#[tokio::test]
async fn changeset_submitted_after_shutdown_is_discarded() {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = Orchestrator::with_config("writes", backend.clone(), fast_config(2));

    let mut before = Changeset::new();
    let before_handle = before.add(book(1));
    orchestrator.submit(before).await.unwrap();

    orchestrator.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::ShutDown);

    let mut after = Changeset::new();
    let after_handles: Vec<_> = (2..=4).map(|id| after.add(book(id))).collect();
    let result = orchestrator.submit(after).await;

    assert_eq!(result.unwrap_err(), WorkError::DiscardedAfterShutdown);
    assert!(before_handle.wait().await.is_ok());
    for handle in after_handles {
        assert_eq!(handle.wait().await, Err(WorkError::DiscardedAfterShutdown));
    }
    assert_eq!(backend.received_ids().await, vec!["1"]);
}

#[tokio::test]
async fn delete_of_missing_document_succeeds() {
    let backend = Arc::new(RecordingBackend::new());
    backend.reject("404", 404).await;
    let orchestrator = Orchestrator::with_config("writes", backend, fast_config(1));

    let mut changeset = Changeset::new();
    let handle = changeset.add(Work::delete("books", "404"));
    orchestrator.submit(changeset).await.unwrap();

    assert_eq!(handle.wait().await.unwrap().status, 404);
}
