//! Orchestrator lifecycle errors.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by orchestrator lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Queued works did not drain in time; the rest were abandoned.
    #[error("Orchestrator did not drain within {0:?}; remaining works were abandoned")]
    ShutdownTimedOut(Duration),

    /// A partition worker terminated abnormally.
    #[error("Orchestrator worker failed: {0}")]
    WorkerFailed(String),
}
