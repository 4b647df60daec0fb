//! Failures reported through work and changeset completion handles.

use search_indexer_shared::DocumentReference;
use thiserror::Error;

/// Why a single work (or a whole changeset) did not complete successfully.
///
/// The error is cloned into every handle it affects: a transport failure of
/// one bulk request resolves all of the works it carried with the same value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkError {
    /// The orchestrator was shut down before the changeset was admitted.
    #[error("Changeset discarded: the orchestrator was shut down before submission")]
    DiscardedAfterShutdown,

    /// Submission was interrupted while waiting for queue capacity.
    #[error("Interrupted while waiting to submit the changeset; none of its works were queued")]
    InterruptedWhileSubmitting,

    /// The bulk request carrying the work failed as a whole.
    #[error("Bulk request failed after {attempts} attempt(s): {message}")]
    RequestFailed { attempts: u32, message: String },

    /// The backend rejected this particular item.
    #[error("Backend rejected work on {document} with status {status}: {reason}")]
    Rejected {
        document: DocumentReference,
        status: u16,
        error_type: Option<String>,
        reason: String,
    },

    /// The work could not be turned into a bulk line.
    #[error("Invalid work on {document}: {reason}")]
    InvalidWork {
        document: DocumentReference,
        reason: String,
    },

    /// The bulk response had fewer items than the request.
    #[error("No bulk response item for work on {document}")]
    MissingResponseItem { document: DocumentReference },

    /// An earlier work of the same changeset failed, so this one was not applied.
    #[error("Work on {document} skipped because of a previous failure in the same changeset: {cause}")]
    SkippedBecauseOfPreviousWork {
        document: DocumentReference,
        cause: Box<WorkError>,
    },

    /// The work was dropped without ever being resolved, e.g. after a
    /// shutdown timeout.
    #[error("{target} was abandoned before completion")]
    Abandoned { target: String },
}

impl WorkError {
    /// Create a request failure.
    pub fn request_failed(attempts: u32, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            attempts,
            message: message.into(),
        }
    }

    /// Create an invalid work error.
    pub fn invalid(document: DocumentReference, reason: impl Into<String>) -> Self {
        Self::InvalidWork {
            document,
            reason: reason.into(),
        }
    }

    /// Create a skip error caused by `cause`.
    pub fn skipped(document: DocumentReference, cause: WorkError) -> Self {
        Self::SkippedBecauseOfPreviousWork {
            document,
            cause: Box::new(cause),
        }
    }

    /// Create an abandoned error for the given target description.
    pub fn abandoned(target: impl Into<String>) -> Self {
        Self::Abandoned {
            target: target.into(),
        }
    }

    /// Whether this error only reflects the failure of another work.
    pub fn is_skip(&self) -> bool {
        matches!(self, WorkError::SkippedBecauseOfPreviousWork { .. })
    }

    /// The underlying failure, following skip causes.
    pub fn root_cause(&self) -> &WorkError {
        match self {
            WorkError::SkippedBecauseOfPreviousWork { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
