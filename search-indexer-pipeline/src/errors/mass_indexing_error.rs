//! Mass indexing job outcomes.

use search_indexer_repository::BackendError;
use thiserror::Error;

use crate::mass_indexing::IndexingFailure;

/// Errors that end a mass indexing job.
#[derive(Error, Debug, Clone)]
pub enum MassIndexingError {
    /// The job options were rejected before anything started.
    #[error("Invalid mass indexing options: {0}")]
    InvalidOptions(String),

    /// Dropping, purging or refreshing an index failed.
    #[error("Index management failed: {0}")]
    Schema(#[from] BackendError),

    /// The job ran to completion but some entities could not be indexed.
    #[error("{count} failure(s) occurred during mass indexing; first failure: {first}")]
    Failures {
        count: u64,
        first: Box<IndexingFailure>,
    },

    /// Fail-fast mode stopped the job on its first failure.
    #[error("Mass indexing aborted on first failure: {cause}")]
    FailFast { cause: Box<IndexingFailure> },

    /// The job was cancelled or one of its tasks died.
    #[error(
        "Mass indexing of {type_groups:?} was interrupted; the index is left in an unknown state, run mass indexing again"
    )]
    Interrupted { type_groups: Vec<String> },
}

impl MassIndexingError {
    /// Create an invalid options error.
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }
}
