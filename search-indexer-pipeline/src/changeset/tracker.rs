//! Shared completion state of one submitted changeset.

use std::sync::{Arc, Mutex, PoisonError};

use search_indexer_shared::Work;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::changeset::{WorkReport, WorkResult};
use crate::errors::WorkError;

/// How a queued work ended up being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Succeeded,
    Failed,
    Skipped,
}

struct TrackerState {
    next_position: usize,
    remaining: usize,
    first_failure: Option<(usize, WorkError)>,
    skip_logged: bool,
    done: Option<oneshot::Sender<Result<(), WorkError>>>,
}

/// Tracks which works of a changeset are still pending and which one failed
/// first. Shared by every [`QueuedWork`] of the changeset, whichever
/// partition it was routed to.
pub(crate) struct ChangesetTracker {
    id: Uuid,
    skip_after_failure: bool,
    state: Mutex<TrackerState>,
}

impl ChangesetTracker {
    pub(crate) fn new(
        id: Uuid,
        skip_after_failure: bool,
        done: oneshot::Sender<Result<(), WorkError>>,
    ) -> Self {
        Self {
            id,
            skip_after_failure,
            state: Mutex::new(TrackerState {
                next_position: 0,
                remaining: 0,
                first_failure: None,
                skip_logged: false,
                done: Some(done),
            }),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new work and return its position in the changeset.
    fn register(&self) -> usize {
        let mut state = self.lock();
        let position = state.next_position;
        state.next_position += 1;
        state.remaining += 1;
        position
    }

    /// Complete the changeset right away if it holds no work.
    pub(crate) fn seal(&self) {
        let mut state = self.lock();
        if state.remaining == 0 {
            if let Some(done) = state.done.take() {
                let _ = done.send(Ok(()));
            }
        }
    }

    /// The first failure recorded at a position lower than `position`.
    fn failure_before(&self, position: usize) -> Option<WorkError> {
        if !self.skip_after_failure {
            return None;
        }
        let state = self.lock();
        match &state.first_failure {
            Some((failed_at, error)) if *failed_at < position => Some(error.clone()),
            _ => None,
        }
    }

    /// Record the outcome of the work at `position` and return the result its
    /// handle must observe. With `skip_after_failure`, the outcome of a work
    /// placed after an already failed one is replaced by a skip error.
    fn resolve(
        &self,
        position: usize,
        work: &Work,
        result: WorkResult,
        skip_after_failure: bool,
    ) -> WorkResult {
        let mut state = self.lock();

        let prior_failure = if skip_after_failure && self.skip_after_failure {
            state
                .first_failure
                .as_ref()
                .filter(|(failed_at, _)| *failed_at < position)
                .map(|(_, cause)| cause.clone())
        } else {
            None
        };

        let result = match prior_failure {
            Some(cause) => {
                debug!(
                    changeset_id = %self.id,
                    document = %work.document(),
                    outcome = ?result.as_ref().map(|report| report.status),
                    "Overriding work outcome: a previous work of the changeset failed"
                );
                if !state.skip_logged {
                    state.skip_logged = true;
                    warn!(
                        changeset_id = %self.id,
                        cause = %cause,
                        "Skipping the remaining works of changeset after a failure"
                    );
                }
                Err(WorkError::skipped(work.document(), cause))
            }
            None => result,
        };

        if let Err(error) = &result {
            let replace = match &state.first_failure {
                Some((failed_at, _)) => position < *failed_at,
                None => true,
            };
            if replace {
                state.first_failure = Some((position, error.clone()));
            }
        }

        state.remaining = state.remaining.saturating_sub(1);
        if state.remaining == 0 {
            if let Some(done) = state.done.take() {
                let outcome = match &state.first_failure {
                    Some((_, error)) => Err(error.clone()),
                    None => Ok(()),
                };
                debug!(changeset_id = %self.id, success = outcome.is_ok(), "Changeset completed");
                let _ = done.send(outcome);
            }
        }

        result
    }
}

/// A work travelling through a partition queue, together with everything
/// needed to resolve its handle.
pub(crate) struct QueuedWork {
    work: Work,
    position: usize,
    tracker: Arc<ChangesetTracker>,
    completer: oneshot::Sender<WorkResult>,
}

impl QueuedWork {
    pub(crate) fn register(
        work: Work,
        tracker: Arc<ChangesetTracker>,
        completer: oneshot::Sender<WorkResult>,
    ) -> Self {
        let position = tracker.register();
        Self {
            work,
            position,
            tracker,
            completer,
        }
    }

    pub(crate) fn work(&self) -> &Work {
        &self.work
    }

    pub(crate) fn changeset_id(&self) -> Uuid {
        self.tracker.id()
    }

    /// Resolve the work, or skip it when an earlier work of its changeset
    /// failed in the meantime.
    pub(crate) fn complete(self, result: WorkResult) -> Completion {
        let result = self
            .tracker
            .resolve(self.position, &self.work, result, true);
        let completion = match &result {
            Ok(_) => Completion::Succeeded,
            Err(error) if error.is_skip() => Completion::Skipped,
            Err(_) => Completion::Failed,
        };
        // The caller may have dropped its handle.
        let _ = self.completer.send(result);
        completion
    }

    /// Fail the work with exactly `error`, without the skip substitution.
    pub(crate) fn fail(self, error: WorkError) {
        let result = self
            .tracker
            .resolve(self.position, &self.work, Err(error), false);
        let _ = self.completer.send(result);
    }

    /// Resolve the work as skipped if an earlier work of its changeset has
    /// already failed; otherwise hand it back.
    pub(crate) fn skip_if_preceded_by_failure(self) -> Option<Self> {
        match self.tracker.failure_before(self.position) {
            Some(cause) => {
                let document = self.work.document();
                self.complete(Err(WorkError::skipped(document, cause)));
                None
            }
            None => Some(self),
        }
    }
}

impl std::fmt::Debug for QueuedWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedWork")
            .field("changeset_id", &self.changeset_id())
            .field("position", &self.position)
            .field("document", &self.work.document())
            .field("operation", &self.work.operation)
            .finish()
    }
}

/// Successful outcome reported for a work, built from its bulk item status.
pub(crate) fn report_for(work: &Work, status: u16, result: Option<String>) -> WorkReport {
    WorkReport {
        document: work.document(),
        status,
        result,
    }
}
