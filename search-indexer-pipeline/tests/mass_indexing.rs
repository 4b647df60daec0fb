//! End-to-end mass indexing against a recording backend.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use search_indexer_pipeline::mass_indexing::{FailureKind, ProgressReport, TypeGroupPhase};
use search_indexer_pipeline::{
    DocumentBuildError, EntityLoader, EntityTypeGroup, IdentifierLoader, LoadError,
    MassIndexer, MassIndexingError, MassIndexingMonitor, MassIndexingOptions,
    MassIndexingSummary, Orchestrator,
};
use search_indexer_shared::IndexedDocument;
use serde_json::json;

use common::{fast_config, RecordingBackend};

#[derive(Debug, Clone)]
struct Article {
    id: u64,
    title: String,
}

/// Identifiers `0..count`, optionally followed by a stream that never ends.
struct ArticleIds {
    count: u64,
    hang_after: bool,
}

#[async_trait]
impl IdentifierLoader for ArticleIds {
    async fn total_count(&self) -> Result<Option<u64>, LoadError> {
        Ok(Some(self.count))
    }

    fn identifiers(&self) -> BoxStream<'static, Result<String, LoadError>> {
        let ids = stream::iter((0..self.count).map(|id| Ok(id.to_string())));
        if self.hang_after {
            ids.chain(stream::pending()).boxed()
        } else {
            ids.boxed()
        }
    }
}

struct ArticleLoader;

#[async_trait]
impl EntityLoader for ArticleLoader {
    type Entity = Article;

    async fn load(&self, ids: &[String]) -> Result<Vec<Article>, LoadError> {
        ids.iter()
            .map(|id| {
                let id: u64 = id
                    .parse()
                    .map_err(|_| LoadError::entities(format!("bad id {id}")))?;
                Ok(Article {
                    id,
                    title: format!("Article {id}"),
                })
            })
            .collect()
    }
}

type BuildFn = Box<dyn Fn(&Article) -> Result<IndexedDocument, DocumentBuildError> + Send + Sync>;

fn builder_failing_on(predicate: fn(u64) -> bool) -> BuildFn {
    Box::new(move |article: &Article| {
        if predicate(article.id) {
            return Err(DocumentBuildError::new(article.id.to_string(), "cannot render title"));
        }
        Ok(IndexedDocument::new(
            article.id.to_string(),
            json!({ "title": article.title }),
        ))
    })
}

fn articles(count: u64, predicate: fn(u64) -> bool) -> EntityTypeGroup<ArticleIds, ArticleLoader, BuildFn> {
    EntityTypeGroup::new(
        "article",
        "articles",
        ArticleIds {
            count,
            hang_after: false,
        },
        ArticleLoader,
        builder_failing_on(predicate),
    )
}

fn never(_: u64) -> bool {
    false
}

/// Monitor keeping the last report and the summary.
#[derive(Default)]
struct CapturingMonitor {
    reports: Mutex<Vec<ProgressReport>>,
    summary: Mutex<Option<MassIndexingSummary>>,
}

impl MassIndexingMonitor for CapturingMonitor {
    fn progress(&self, report: &ProgressReport) {
        self.reports.lock().unwrap().push(*report);
    }

    fn finished(&self, summary: &MassIndexingSummary) {
        *self.summary.lock().unwrap() = Some(summary.clone());
    }
}

fn setup() -> (Arc<RecordingBackend>, Arc<Orchestrator>) {
    setup_with_queues(2)
}

fn setup_with_queues(queue_count: usize) -> (Arc<RecordingBackend>, Arc<Orchestrator>) {
    let backend = Arc::new(RecordingBackend::new());
    let orchestrator = Arc::new(Orchestrator::with_config(
        "mass-indexing",
        backend.clone(),
        fast_config(queue_count),
    ));
    (backend, orchestrator)
}

#[tokio::test]
async fn batches_of_one_hundred_produce_three_bulk_requests() {
    let (backend, orchestrator) = setup_with_queues(1);
    let monitor = Arc::new(CapturingMonitor::default());

    let job = MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(250, never))
        .options(MassIndexingOptions::default().with_batch_size(100))
        .monitor(monitor.clone())
        .start()
        .unwrap();
    let summary = job.await_completion().await.unwrap();

    let mut sizes = backend.request_sizes().await;
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);
    assert_eq!(summary.documents_indexed, 250);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.type_groups[0].phase, TypeGroupPhase::Done);

    let last = *monitor.reports.lock().unwrap().last().unwrap();
    assert_eq!(last.snapshot.done, 250);
    assert_eq!(last.snapshot.total, Some(250));
    assert!(monitor.summary.lock().unwrap().is_some());
}

#[tokio::test]
async fn batches_are_split_across_partitions() {
    let (backend, orchestrator) = setup_with_queues(2);

    let job = MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(250, never))
        .options(MassIndexingOptions::default().with_batch_size(100))
        .start()
        .unwrap();
    let summary = job.await_completion().await.unwrap();

    let sizes = backend.request_sizes().await;
    assert!(sizes.len() >= 3);
    assert!(sizes.iter().all(|&size| size > 0 && size <= 100));
    assert_eq!(sizes.iter().sum::<usize>(), 250);
    assert_eq!(summary.documents_indexed, 250);
}

#[tokio::test]
async fn progress_reaches_total_when_every_entity_is_indexed() {
    let (backend, orchestrator) = setup();
    let monitor = Arc::new(CapturingMonitor::default());

    let job = MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(1234, never))
        .options(MassIndexingOptions::default().with_batch_size(64))
        .monitor(monitor.clone())
        .start()
        .unwrap();
    assert!(job.progress().done <= 1234);
    let summary = job.await_completion().await.unwrap();

    let reports = monitor.reports.lock().unwrap().clone();
    let last = reports.last().unwrap().snapshot;
    assert_eq!(last.total, Some(1234));
    assert_eq!(last.done, 1234);
    assert_eq!(last.percent(), Some(100.0));
    assert!(reports.windows(2).all(|w| w[0].snapshot.done <= w[1].snapshot.done));
    assert_eq!(summary.documents_indexed, 1234);
    assert_eq!(backend.received_ids().await.len(), 1234);
}

#[tokio::test]
async fn purge_and_refresh_surround_the_job() {
    let (backend, orchestrator) = setup();

    MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(3, never))
        .start()
        .unwrap()
        .await_completion()
        .await
        .unwrap();

    assert_eq!(
        *backend.admin_calls.lock().await,
        vec!["purge:articles".to_string(), "refresh:articles".to_string()]
    );
}

#[tokio::test]
async fn drop_and_create_replaces_purge() {
    let (backend, orchestrator) = setup();

    MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(3, never))
        .options(
            MassIndexingOptions::default()
                .with_drop_and_create_schema_on_start(true)
                .with_refresh_on_finish(false),
        )
        .start()
        .unwrap()
        .await_completion()
        .await
        .unwrap();

    assert_eq!(
        *backend.admin_calls.lock().await,
        vec!["drop_and_create:articles".to_string()]
    );
}

#[tokio::test]
async fn failures_past_the_threshold_are_counted() {
    let (backend, orchestrator) = setup();

    let result = MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(600, |id| id % 6 != 0))
        .options(
            MassIndexingOptions::default()
                .with_batch_size(50)
                .with_failure_flooding_threshold(10),
        )
        .start()
        .unwrap()
        .await_completion()
        .await;

    match result {
        Err(MassIndexingError::Failures { count, first }) => {
            assert_eq!(count, 500);
            assert_eq!(first.kind, FailureKind::DocumentBuilding);
            assert_eq!(first.entity_ids, vec!["1".to_string()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(backend.received_ids().await.len(), 100);
}

#[tokio::test]
async fn fail_fast_stops_at_the_first_failing_entity() {
    let (backend, orchestrator) = setup();

    let result = MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(1000, |id| id == 42))
        .options(
            MassIndexingOptions::default()
                .with_batch_size(10)
                .with_fail_fast(true),
        )
        .start()
        .unwrap()
        .await_completion()
        .await;

    match result {
        Err(MassIndexingError::FailFast { cause }) => {
            assert_eq!(cause.entity_ids, vec!["42".to_string()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let ids = backend.received_ids().await;
    assert_eq!(ids.len(), 40);
    assert!(ids.iter().all(|id| id.parse::<u64>().unwrap() < 42));
    assert!(!backend
        .admin_calls
        .lock()
        .await
        .iter()
        .any(|call| call.starts_with("refresh")));
}

#[tokio::test]
async fn rejected_documents_are_reported_as_indexing_failures() {
    let (backend, orchestrator) = setup();
    backend.reject("7", 400).await;

    let monitor = Arc::new(CapturingMonitor::default());

    let result = MassIndexer::new(orchestrator, backend.clone())
        .type_group(articles(20, never))
        .options(MassIndexingOptions::default().with_batch_size(20))
        .monitor(monitor.clone())
        .start()
        .unwrap()
        .await_completion()
        .await;

    match result {
        Err(MassIndexingError::Failures { count, first }) => {
            assert_eq!(count, 1);
            assert_eq!(first.kind, FailureKind::Indexing);
            assert_eq!(first.entity_ids, vec!["7".to_string()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    // Documents of the same batch are independent of the rejected one.
    let summary = monitor.summary.lock().unwrap().clone().unwrap();
    assert_eq!(summary.documents_indexed, 19);
    assert_eq!(summary.failures, 1);
}

#[tokio::test]
async fn cancelled_job_is_interrupted() {
    let (backend, orchestrator) = setup();
    let group = EntityTypeGroup::new(
        "article",
        "articles",
        ArticleIds {
            count: 25,
            hang_after: true,
        },
        ArticleLoader,
        builder_failing_on(never),
    );

    let job = MassIndexer::new(orchestrator, backend.clone())
        .type_group(group)
        .options(MassIndexingOptions::default().with_batch_size(10))
        .start()
        .unwrap();

    while job.progress().done < 20 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    job.cancel();

    match job.await_completion().await {
        Err(MassIndexingError::Interrupted { type_groups }) => {
            assert_eq!(type_groups, vec!["article".to_string()]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(backend.received_ids().await.len(), 20);
}

#[tokio::test]
async fn invalid_options_are_rejected_before_starting() {
    let (backend, orchestrator) = setup();

    let result = MassIndexer::new(orchestrator.clone(), backend.clone())
        .type_group(articles(1, never))
        .options(MassIndexingOptions::default().with_batch_size(0))
        .start();
    assert!(matches!(result, Err(MassIndexingError::InvalidOptions(_))));

    let result = MassIndexer::new(orchestrator, backend.clone()).start();
    assert!(matches!(result, Err(MassIndexingError::InvalidOptions(_))));
    assert!(backend.admin_calls.lock().await.is_empty());
}
