//! Mass indexing: rebuilds indexes from the entities of one or more type
//! groups.
//!
//! For every type group, identifiers are streamed and split into batches of
//! `batch_size`; each batch is loaded, turned into documents and submitted to
//! the orchestrator as one changeset of independent works. Failures are
//! counted by a [`FailureAccumulator`]; with `fail_fast` the first one stops
//! the job. Progress is reported periodically to a [`MassIndexingMonitor`].

mod coordinator;
mod failure;
mod loader;
mod monitor;
mod options;
mod progress;

pub use coordinator::{MassIndexer, MassIndexingJob};
pub use failure::{FailureAccumulator, FailureKind, IndexingFailure};
pub use loader::{
    DocumentBuilder, EntityLoader, EntityTypeGroup, IdentifierLoader, LoadedBatch, TypeGroup,
};
pub use monitor::{
    LoggingMonitor, MassIndexingMonitor, MassIndexingSummary, TypeGroupPhase, TypeGroupStatus,
};
pub use options::MassIndexingOptions;
pub use progress::{ProgressCounter, ProgressReport, ProgressSnapshot};
