//! Failure accounting for mass indexing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{error, warn};

/// The stage at which an entity could not be indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Loading identifiers (or counting them) failed.
    IdentifierLoading,
    /// Loading entities from identifiers failed.
    EntityLoading,
    /// Turning an entity into a document failed.
    DocumentBuilding,
    /// The backend did not apply the document.
    Indexing,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::IdentifierLoading => "identifier loading",
            FailureKind::EntityLoading => "entity loading",
            FailureKind::DocumentBuilding => "document building",
            FailureKind::Indexing => "indexing",
        };
        f.write_str(name)
    }
}

/// One failure observed while mass indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingFailure {
    /// Type group being indexed.
    pub type_group: String,
    /// Failed stage.
    pub kind: FailureKind,
    /// Identifiers of the affected entities, when known.
    pub entity_ids: Vec<String>,
    /// Error message.
    pub message: String,
}

impl IndexingFailure {
    /// Create a failure.
    pub fn new(
        type_group: impl Into<String>,
        kind: FailureKind,
        entity_ids: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_group: type_group.into(),
            kind,
            entity_ids,
            message: message.into(),
        }
    }
}

impl fmt::Display for IndexingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure in type group '{}'", self.kind, self.type_group)?;
        if !self.entity_ids.is_empty() {
            write!(f, " for entities {:?}", self.entity_ids)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Default)]
struct RetainedFailures {
    first: Option<IndexingFailure>,
    details: Vec<IndexingFailure>,
}

/// Counts failures and keeps the details of the first ones.
///
/// Past the flooding threshold, failures are still counted but no longer
/// logged or retained; a single warning marks the transition.
pub struct FailureAccumulator {
    threshold: u64,
    count: AtomicU64,
    retained: Mutex<RetainedFailures>,
}

impl FailureAccumulator {
    /// Create an accumulator with the given flooding threshold.
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            count: AtomicU64::new(0),
            retained: Mutex::new(RetainedFailures::default()),
        }
    }

    /// Record a failure and return the running count.
    pub fn record(&self, failure: IndexingFailure) -> u64 {
        // Counted under the lock so `first` is also the first retained detail.
        let mut retained = self.retained.lock().unwrap_or_else(PoisonError::into_inner);
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;

        if retained.first.is_none() {
            retained.first = Some(failure.clone());
        }

        if count <= self.threshold {
            error!(
                type_group = %failure.type_group,
                kind = %failure.kind,
                entity_ids = ?failure.entity_ids,
                error = %failure.message,
                "Mass indexing failure"
            );
            retained.details.push(failure);
        } else if count == self.threshold + 1 {
            warn!(
                threshold = self.threshold,
                "Failure flooding threshold reached; further failures are counted but not logged"
            );
        }
        count
    }

    /// Total number of failures recorded.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// The first failure recorded.
    pub fn first(&self) -> Option<IndexingFailure> {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .first
            .clone()
    }

    /// Details of the failures recorded before the threshold was reached.
    pub fn retained(&self) -> Vec<IndexingFailure> {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .details
            .clone()
    }

    /// Whether more failures were recorded than the threshold.
    pub fn is_flooded(&self) -> bool {
        self.count() > self.threshold
    }
}
