//! Orchestrator module for the indexing pipeline.
//!
//! Accepts changesets from any number of producers and routes each work to a
//! partition chosen from its routing key. Every partition has a bounded
//! queue and a single worker, so works sharing a routing key are applied in
//! submission order while different keys proceed in parallel.

mod worker;

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use search_indexer_repository::SearchBackend;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::batcher::BatcherConfig;
use crate::changeset::{Changeset, ChangesetCompletion, QueuedWork};
use crate::errors::{OrchestratorError, WorkError};
use crate::executor::{BulkExecutor, RetryPolicy};

use worker::PartitionWorker;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of partitions (queues with their own worker).
    pub queue_count: usize,
    /// Maximum number of queued changeset parts per partition.
    pub queue_capacity: usize,
    /// Bulk request thresholds.
    pub batcher: BatcherConfig,
    /// Retry policy for failed bulk requests.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_count: 1,
            queue_capacity: 1000,
            batcher: BatcherConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Lifecycle of an orchestrator. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrchestratorState {
    /// Accepting submissions.
    Running = 0,
    /// Rejecting submissions, draining queued works.
    ShuttingDown = 1,
    /// All workers stopped.
    ShutDown = 2,
}

impl OrchestratorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => OrchestratorState::Running,
            1 => OrchestratorState::ShuttingDown,
            _ => OrchestratorState::ShutDown,
        }
    }
}

/// Routes changesets to partition workers and manages their lifecycle.
///
/// The orchestrator is shared by reference (`Arc<Orchestrator>`) between
/// producers; all methods take `&self`.
pub struct Orchestrator {
    name: String,
    state: AtomicU8,
    partitions: Vec<mpsc::Sender<Vec<QueuedWork>>>,
    shutdown_token: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Start an orchestrator with the default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, backend: Arc<dyn SearchBackend>) -> Self {
        Self::with_config(name, backend, OrchestratorConfig::default())
    }

    /// Start an orchestrator with a custom configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_config(
        name: impl Into<String>,
        backend: Arc<dyn SearchBackend>,
        config: OrchestratorConfig,
    ) -> Self {
        let name = name.into();
        let queue_count = config.queue_count.max(1);
        let executor = Arc::new(BulkExecutor::new(backend, config.retry));
        let shutdown_token = CancellationToken::new();

        let mut partitions = Vec::with_capacity(queue_count);
        let mut workers = Vec::with_capacity(queue_count);
        for partition in 0..queue_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            let worker = PartitionWorker::new(
                partition,
                rx,
                config.batcher,
                executor.clone(),
                shutdown_token.clone(),
            );
            workers.push(tokio::spawn(worker.run()));
            partitions.push(tx);
        }

        info!(
            orchestrator = %name,
            queue_count,
            queue_capacity = config.queue_capacity,
            max_bulk_actions = config.batcher.max_bulk_actions,
            "Started orchestrator"
        );

        Self {
            name,
            state: AtomicU8::new(OrchestratorState::Running as u8),
            partitions,
            shutdown_token,
            workers: Mutex::new(workers),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        OrchestratorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Submit a changeset, waiting for queue capacity if needed.
    ///
    /// Either every work of the changeset is queued or none is. After
    /// shutdown has started the changeset is discarded: every handle resolves
    /// to [`WorkError::DiscardedAfterShutdown`] and the same error is
    /// returned.
    pub async fn submit(&self, changeset: Changeset) -> Result<ChangesetCompletion, WorkError> {
        self.admit(changeset, None).await
    }

    /// Like [`Orchestrator::submit`], but gives up when `interrupt` is
    /// cancelled while waiting for capacity. Nothing is queued in that case
    /// and every handle resolves to [`WorkError::InterruptedWhileSubmitting`].
    pub async fn submit_interruptible(
        &self,
        changeset: Changeset,
        interrupt: &CancellationToken,
    ) -> Result<ChangesetCompletion, WorkError> {
        self.admit(changeset, Some(interrupt)).await
    }

    #[instrument(skip_all, fields(orchestrator = %self.name, changeset_id = %changeset.id(), works = changeset.len()))]
    async fn admit(
        &self,
        changeset: Changeset,
        interrupt: Option<&CancellationToken>,
    ) -> Result<ChangesetCompletion, WorkError> {
        if self.state() != OrchestratorState::Running {
            warn!(context = ?changeset.context(), "Changeset submitted after shutdown; discarding");
            return Err(changeset.discard(WorkError::DiscardedAfterShutdown));
        }

        let (completion, works) = changeset.into_submission();

        let mut groups: BTreeMap<usize, Vec<QueuedWork>> = BTreeMap::new();
        for work in works {
            let partition = self.partition_for(work.work().ordering_key());
            groups.entry(partition).or_default().push(work);
        }

        let targets: Vec<usize> = groups.keys().copied().collect();
        let mut permits = Vec::with_capacity(targets.len());
        let mut rejection = None;

        for partition in targets {
            let sender = &self.partitions[partition];
            let reserved = match interrupt {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(WorkError::InterruptedWhileSubmitting),
                    permit = sender.reserve() => permit.map_err(|_| WorkError::DiscardedAfterShutdown),
                },
                None => sender
                    .reserve()
                    .await
                    .map_err(|_| WorkError::DiscardedAfterShutdown),
            };

            match reserved {
                Ok(permit) => permits.push(permit),
                Err(error) => {
                    rejection = Some(error);
                    break;
                }
            }
        }

        if let Some(error) = rejection {
            drop(permits);
            warn!(error = %error, "Changeset rejected before queuing");
            for work in groups.into_values().flatten() {
                work.fail(error.clone());
            }
            return Err(error);
        }

        for (permit, works) in permits.into_iter().zip(groups.into_values()) {
            permit.send(works);
        }
        debug!("Changeset queued");

        Ok(completion)
    }

    /// Stop accepting changesets and wait for queued works to be executed.
    ///
    /// Workers still running after `timeout` are aborted; works they held
    /// resolve to [`WorkError::Abandoned`]. Calling this again after a
    /// completed shutdown is a no-op.
    #[instrument(skip(self), fields(orchestrator = %self.name))]
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), OrchestratorError> {
        let _ = self.state.compare_exchange(
            OrchestratorState::Running as u8,
            OrchestratorState::ShuttingDown as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return Ok(());
        }

        info!("Shutting down orchestrator");
        self.shutdown_token.cancel();

        let handles: Vec<JoinHandle<()>> = workers.drain(..).collect();
        let abort_handles: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        let result = match tokio::time::timeout(timeout, join_all(handles)).await {
            Ok(results) => {
                let failures: Vec<String> = results
                    .into_iter()
                    .filter_map(Result::err)
                    .map(|e| e.to_string())
                    .collect();
                if failures.is_empty() {
                    Ok(())
                } else {
                    error!(failures = ?failures, "Partition workers terminated abnormally");
                    Err(OrchestratorError::WorkerFailed(failures.join("; ")))
                }
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Shutdown timed out; aborting workers");
                for handle in abort_handles {
                    handle.abort();
                }
                Err(OrchestratorError::ShutdownTimedOut(timeout))
            }
        };

        self.state
            .store(OrchestratorState::ShutDown as u8, Ordering::Release);
        info!("Orchestrator shut down");
        result
    }

    fn partition_for(&self, ordering_key: &str) -> usize {
        if self.partitions.len() == 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        ordering_key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("partitions", &self.partitions.len())
            .finish()
    }
}
