//! Mass indexing coordination.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use search_indexer_repository::{BackendError, SearchBackend};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use super::failure::{FailureAccumulator, FailureKind, IndexingFailure};
use super::loader::TypeGroup;
use super::monitor::{
    LoggingMonitor, MassIndexingMonitor, MassIndexingSummary, TypeGroupPhase, TypeGroupStatus,
};
use super::options::MassIndexingOptions;
use super::progress::{spawn_progress_reporter, ProgressCounter, ProgressSnapshot};
use crate::changeset::{Changeset, WorkHandle};
use crate::errors::MassIndexingError;
use crate::orchestrator::Orchestrator;

/// Builder and entry point of mass indexing jobs.
///
/// # Example
///
/// ```ignore
/// let job = MassIndexer::new(orchestrator, backend)
///     .type_group(EntityTypeGroup::new("book", "books", ids, loader, builder))
///     .options(MassIndexingOptions::default().with_batch_size(500))
///     .start()?;
/// let summary = job.await_completion().await?;
/// ```
pub struct MassIndexer {
    orchestrator: Arc<Orchestrator>,
    backend: Arc<dyn SearchBackend>,
    monitor: Arc<dyn MassIndexingMonitor>,
    type_groups: BTreeMap<String, Arc<dyn TypeGroup>>,
    options: MassIndexingOptions,
}

impl MassIndexer {
    /// Create a mass indexer writing through `orchestrator`. `backend` is used
    /// for index administration (drop, purge, refresh).
    pub fn new(orchestrator: Arc<Orchestrator>, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            orchestrator,
            backend,
            monitor: Arc::new(LoggingMonitor),
            type_groups: BTreeMap::new(),
            options: MassIndexingOptions::default(),
        }
    }

    /// Add a type group to index. A group with the same name is replaced.
    pub fn type_group<G>(mut self, group: G) -> Self
    where
        G: TypeGroup + 'static,
    {
        let name = group.name().to_string();
        if self.type_groups.insert(name.clone(), Arc::new(group)).is_some() {
            warn!(type_group = %name, "Type group registered twice; keeping the last one");
        }
        self
    }

    /// Set the job options.
    pub fn options(mut self, options: MassIndexingOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the default logging monitor.
    pub fn monitor(mut self, monitor: Arc<dyn MassIndexingMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Validate the options and start the job in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<MassIndexingJob, MassIndexingError> {
        self.options.validate()?;
        if self.type_groups.is_empty() {
            return Err(MassIndexingError::invalid_options(
                "at least one type group must be selected",
            ));
        }

        let id = Uuid::new_v4();
        let type_groups: Vec<String> = self.type_groups.keys().cloned().collect();
        let cancel = CancellationToken::new();
        let progress = Arc::new(ProgressCounter::new());

        let context = Arc::new(JobContext {
            orchestrator: self.orchestrator,
            failures: FailureAccumulator::new(self.options.failure_flooding_threshold),
            options: self.options,
            progress: progress.clone(),
            cancel: cancel.clone(),
            aborted_on_failure: AtomicBool::new(false),
        });
        let groups: Vec<Arc<dyn TypeGroup>> = self.type_groups.into_values().collect();

        let span = info_span!("mass_indexing", job_id = %id);
        let handle = tokio::spawn(
            run_job(context, self.backend, self.monitor, groups).instrument(span),
        );

        Ok(MassIndexingJob {
            id,
            type_groups,
            cancel,
            progress,
            handle,
        })
    }
}

/// A running mass indexing job.
pub struct MassIndexingJob {
    id: Uuid,
    type_groups: Vec<String>,
    cancel: CancellationToken,
    progress: Arc<ProgressCounter>,
    handle: JoinHandle<Result<MassIndexingSummary, MassIndexingError>>,
}

impl MassIndexingJob {
    /// Identifier of the job, as logged.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Interrupt the job. Requests already sent are not aborted; the job then
    /// ends with [`MassIndexingError::Interrupted`].
    pub fn cancel(&self) {
        info!(job_id = %self.id, "Cancelling mass indexing");
        self.cancel.cancel();
    }

    /// Current progress.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Wait for the job to end.
    pub async fn await_completion(self) -> Result<MassIndexingSummary, MassIndexingError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %self.id, error = %e, "Mass indexing task terminated abnormally");
                Err(MassIndexingError::Interrupted {
                    type_groups: self.type_groups,
                })
            }
        }
    }
}

struct JobContext {
    orchestrator: Arc<Orchestrator>,
    options: MassIndexingOptions,
    progress: Arc<ProgressCounter>,
    failures: FailureAccumulator,
    cancel: CancellationToken,
    aborted_on_failure: AtomicBool,
}

impl JobContext {
    fn record_failure(&self, failure: IndexingFailure) {
        self.failures.record(failure);
        if self.options.fail_fast && !self.aborted_on_failure.swap(true, Ordering::AcqRel) {
            error!("Fail-fast enabled: aborting mass indexing after the first failure");
            self.cancel.cancel();
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted_on_failure.load(Ordering::Acquire)
    }

    /// Phase reached by a type group stopped by the cancel token.
    fn stop_phase(&self) -> TypeGroupPhase {
        if self.is_aborted() {
            TypeGroupPhase::Failed
        } else {
            TypeGroupPhase::Interrupted
        }
    }
}

async fn run_job(
    context: Arc<JobContext>,
    backend: Arc<dyn SearchBackend>,
    monitor: Arc<dyn MassIndexingMonitor>,
    groups: Vec<Arc<dyn TypeGroup>>,
) -> Result<MassIndexingSummary, MassIndexingError> {
    let started_at = Utc::now();
    let started = Instant::now();
    let options = &context.options;
    info!(
        type_groups = ?groups.iter().map(|g| g.name()).collect::<Vec<_>>(),
        batch_size = options.batch_size,
        fail_fast = options.fail_fast,
        "Mass indexing started"
    );

    let indexes: BTreeSet<String> = groups.iter().map(|g| g.index().to_string()).collect();
    prepare_indexes(backend.as_ref(), &indexes, options).await?;

    let reporter_stop = CancellationToken::new();
    let reporter = spawn_progress_reporter(
        context.progress.clone(),
        monitor.clone(),
        options.progress_interval,
        reporter_stop.clone(),
    );

    let permits = Arc::new(Semaphore::new(options.type_group_parallelism));
    let tasks: Vec<(String, JoinHandle<TypeGroupStatus>)> = groups
        .into_iter()
        .map(|group| {
            let name = group.name().to_string();
            let context = context.clone();
            let permits = permits.clone();
            let handle = tokio::spawn(
                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    index_type_group(context, group).await
                }
                .in_current_span(),
            );
            (name, handle)
        })
        .collect();

    let mut statuses = Vec::with_capacity(tasks.len());
    for (name, handle) in tasks {
        let status = match handle.await {
            Ok(status) => status,
            Err(e) => {
                error!(type_group = %name, error = %e, "Type group task terminated abnormally");
                TypeGroupStatus {
                    name,
                    phase: TypeGroupPhase::Interrupted,
                    documents_indexed: 0,
                    failures: 0,
                }
            }
        };
        monitor.type_group_finished(&status);
        statuses.push(status);
    }

    reporter_stop.cancel();
    if let Err(e) = reporter.await {
        warn!(error = %e, "Progress reporter terminated abnormally");
    }

    let interrupted: Vec<String> = statuses
        .iter()
        .filter(|s| s.phase == TypeGroupPhase::Interrupted)
        .map(|s| s.name.clone())
        .collect();
    let aborted = context.is_aborted();

    if interrupted.is_empty() && !aborted && options.refresh_on_finish {
        for index in &indexes {
            debug!(index = %index, "Refreshing index");
            backend.refresh_index(index).await?;
        }
    }

    let summary = MassIndexingSummary {
        started_at,
        elapsed: started.elapsed(),
        documents_indexed: statuses.iter().map(|s| s.documents_indexed).sum(),
        failures: context.failures.count(),
        type_groups: statuses,
    };
    monitor.finished(&summary);

    if aborted {
        if let Some(cause) = context.failures.first() {
            return Err(MassIndexingError::FailFast {
                cause: Box::new(cause),
            });
        }
    }
    if !interrupted.is_empty() {
        error!(
            type_groups = ?interrupted,
            "Mass indexing interrupted; the index is left in an unknown state"
        );
        return Err(MassIndexingError::Interrupted {
            type_groups: interrupted,
        });
    }
    if let Some(first) = context.failures.first() {
        return Err(MassIndexingError::Failures {
            count: context.failures.count(),
            first: Box::new(first),
        });
    }
    Ok(summary)
}

/// Drop and recreate, or purge, every target index.
async fn prepare_indexes(
    backend: &dyn SearchBackend,
    indexes: &BTreeSet<String>,
    options: &MassIndexingOptions,
) -> Result<(), BackendError> {
    for index in indexes {
        if options.drop_and_create_schema_on_start {
            info!(index = %index, "Dropping and recreating index");
            backend.drop_and_create_index(index).await?;
        } else if options.purge_all_on_start {
            info!(index = %index, "Purging index");
            backend.purge_index(index).await?;
        }
    }
    Ok(())
}

#[instrument(skip_all, fields(type_group = %group.name()))]
async fn index_type_group(context: Arc<JobContext>, group: Arc<dyn TypeGroup>) -> TypeGroupStatus {
    let mut status = TypeGroupStatus {
        name: group.name().to_string(),
        phase: TypeGroupPhase::IdentifierLoading,
        documents_indexed: 0,
        failures: 0,
    };

    if context.cancel.is_cancelled() {
        status.phase = context.stop_phase();
        return status;
    }
    info!(index = %group.index(), "Indexing type group");

    match group.total_count().await {
        Ok(count) => context.progress.add_total(count),
        Err(e) => {
            status.failures += 1;
            status.phase = TypeGroupPhase::Failed;
            context.record_failure(IndexingFailure::new(
                group.name(),
                FailureKind::IdentifierLoading,
                Vec::new(),
                e.to_string(),
            ));
            return status;
        }
    }

    let batch_size = context.options.batch_size;
    let mut identifiers = group.identifiers();
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        let next = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => {
                status.phase = context.stop_phase();
                return status;
            }
            next = identifiers.next() => next,
        };

        match next {
            Some(Ok(id)) => {
                batch.push(id);
                if batch.len() >= batch_size {
                    let ids = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    if !index_batch(&context, group.as_ref(), ids, &mut status).await {
                        return status;
                    }
                }
            }
            Some(Err(e)) => {
                status.failures += 1;
                status.phase = TypeGroupPhase::Failed;
                context.record_failure(IndexingFailure::new(
                    group.name(),
                    FailureKind::IdentifierLoading,
                    Vec::new(),
                    e.to_string(),
                ));
                return status;
            }
            None => break,
        }
    }

    if !batch.is_empty() && !index_batch(&context, group.as_ref(), batch, &mut status).await {
        return status;
    }

    status.phase = TypeGroupPhase::Done;
    status
}

/// Load, build and index one batch. Returns false when the type group must stop.
async fn index_batch(
    context: &JobContext,
    group: &dyn TypeGroup,
    ids: Vec<String>,
    status: &mut TypeGroupStatus,
) -> bool {
    if context.cancel.is_cancelled() {
        status.phase = context.stop_phase();
        return false;
    }

    status.phase = TypeGroupPhase::EntityLoading;
    let loaded = group.load_documents(&ids, context.options.fail_fast).await;
    context.progress.add_done(loaded.missing);
    context.progress.add_failed(loaded.failed_entities);
    for failure in loaded.failures {
        status.failures += 1;
        context.record_failure(failure);
    }
    if context.cancel.is_cancelled() {
        status.phase = context.stop_phase();
        return false;
    }
    if loaded.documents.is_empty() {
        return true;
    }

    status.phase = TypeGroupPhase::DocumentBuildingAndSubmitting;
    let mut changeset =
        Changeset::independent().with_context(format!("mass indexing of {}", group.name()));
    let handles: Vec<WorkHandle> = loaded
        .documents
        .into_iter()
        .map(|document| changeset.add(document.into_work(group.index())))
        .collect();
    debug!(documents = handles.len(), "Submitting batch");

    let submitted = context.orchestrator.submit(changeset).await;

    // Handles are resolved whether or not the changeset was admitted.
    for handle in handles {
        let id = handle.document().id.clone();
        match handle.wait().await {
            Ok(_) => status.documents_indexed += 1,
            Err(e) => {
                status.failures += 1;
                context.record_failure(IndexingFailure::new(
                    group.name(),
                    FailureKind::Indexing,
                    vec![id],
                    e.to_string(),
                ));
            }
        }
        context.progress.add_done(1);
    }

    match submitted {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Batch was not accepted by the orchestrator; stopping type group");
            status.phase = TypeGroupPhase::Failed;
            false
        }
    }
}
