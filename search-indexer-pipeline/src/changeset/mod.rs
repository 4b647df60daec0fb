//! Changesets: ordered groups of works submitted together.
//!
//! Adding a work to a [`Changeset`] returns a [`WorkHandle`] resolved once
//! the work was applied, rejected or skipped. Submitting the changeset to
//! the orchestrator returns a [`ChangesetCompletion`] resolved once every
//! work of the changeset has been resolved.
//!
//! Within a changeset, once a work fails, the works placed after it that
//! were not applied yet are skipped rather than sent. Changesets created
//! with [`Changeset::independent`] opt out of this rule.

mod tracker;

use std::fmt;
use std::sync::Arc;

use search_indexer_shared::{DocumentReference, Work};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::WorkError;

pub(crate) use tracker::{report_for, Completion, QueuedWork};
use tracker::ChangesetTracker;

/// Outcome of a successfully applied work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkReport {
    /// The written document.
    pub document: DocumentReference,
    /// HTTP status reported by the backend for this item.
    pub status: u16,
    /// Result keyword reported by the backend (`created`, `deleted`, ...).
    pub result: Option<String>,
}

/// Result delivered through a [`WorkHandle`].
pub type WorkResult = Result<WorkReport, WorkError>;

/// Completion handle of one work.
#[derive(Debug)]
pub struct WorkHandle {
    document: DocumentReference,
    receiver: oneshot::Receiver<WorkResult>,
}

impl WorkHandle {
    /// The document targeted by the work.
    pub fn document(&self) -> &DocumentReference {
        &self.document
    }

    /// Wait for the work to be resolved.
    ///
    /// A work dropped without resolution (worker aborted on shutdown timeout)
    /// resolves to [`WorkError::Abandoned`].
    pub async fn wait(self) -> WorkResult {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(WorkError::abandoned(format!("Work on {}", self.document))),
        }
    }
}

/// Completion handle of a whole changeset.
#[derive(Debug)]
pub struct ChangesetCompletion {
    changeset_id: Uuid,
    receiver: oneshot::Receiver<Result<(), WorkError>>,
}

impl ChangesetCompletion {
    /// Identifier of the changeset.
    pub fn changeset_id(&self) -> Uuid {
        self.changeset_id
    }

    /// Wait until every work of the changeset is resolved. Fails with the
    /// first failure in changeset order.
    pub async fn wait(self) -> Result<(), WorkError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(WorkError::abandoned(format!(
                "Changeset {}",
                self.changeset_id
            ))),
        }
    }
}

/// An ordered group of works submitted to the orchestrator as one unit.
pub struct Changeset {
    id: Uuid,
    context: Option<String>,
    tracker: Arc<ChangesetTracker>,
    works: Vec<QueuedWork>,
    completion: oneshot::Receiver<Result<(), WorkError>>,
}

impl Changeset {
    /// Create an empty changeset.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Create an empty changeset whose works do not depend on each other: a
    /// failed work does not cause the following ones to be skipped.
    pub fn independent() -> Self {
        Self::build(false)
    }

    fn build(skip_after_failure: bool) -> Self {
        let id = Uuid::new_v4();
        let (done_tx, done_rx) = oneshot::channel();
        Self {
            id,
            context: None,
            tracker: Arc::new(ChangesetTracker::new(id, skip_after_failure, done_tx)),
            works: Vec::new(),
            completion: done_rx,
        }
    }

    /// Attach a description used in logs.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Append a work and return its completion handle.
    pub fn add(&mut self, work: Work) -> WorkHandle {
        let (tx, rx) = oneshot::channel();
        let document = work.document();
        self.works
            .push(QueuedWork::register(work, self.tracker.clone(), tx));
        WorkHandle {
            document,
            receiver: rx,
        }
    }

    /// Identifier of the changeset.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Description attached with [`Changeset::with_context`].
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Number of works in the changeset.
    pub fn len(&self) -> usize {
        self.works.len()
    }

    /// Check if the changeset holds no work.
    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    /// The works, in changeset order.
    pub fn works(&self) -> impl Iterator<Item = &Work> {
        self.works.iter().map(QueuedWork::work)
    }

    /// Freeze the changeset for queuing.
    pub(crate) fn into_submission(self) -> (ChangesetCompletion, Vec<QueuedWork>) {
        self.tracker.seal();
        let completion = ChangesetCompletion {
            changeset_id: self.id,
            receiver: self.completion,
        };
        (completion, self.works)
    }

    /// Fail every work with `error` and hand the error back.
    pub(crate) fn discard(self, error: WorkError) -> WorkError {
        for work in self.works {
            work.fail(error.clone());
        }
        error
    }
}

impl Default for Changeset {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Changeset")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("works", &self.works.len())
            .finish()
    }
}
