//! # Search Indexer Pipeline
//!
//! The write side of the search indexer: it accepts document-level works,
//! groups them into bulk requests and applies them to the search backend.
//!
//! ## Architecture
//!
//! 1. **Changeset**: an ordered group of works, each with a completion handle
//! 2. **Orchestrator**: routes works to partition queues by routing key
//! 3. **Batcher**: cuts bulk requests on action count and size
//! 4. **Executor**: sends requests with retries and resolves every handle
//! 5. **Mass indexing**: streams entities from loaders through the orchestrator

pub mod batcher;
pub mod changeset;
pub mod errors;
pub mod executor;
pub mod mass_indexing;
pub mod orchestrator;

pub use batcher::{Batcher, BatcherConfig, BulkRequest};
pub use changeset::{Changeset, ChangesetCompletion, WorkHandle, WorkReport, WorkResult};
pub use errors::{DocumentBuildError, LoadError, MassIndexingError, OrchestratorError, WorkError};
pub use executor::{BulkExecutionSummary, BulkExecutor, RetryPolicy};
pub use mass_indexing::{
    DocumentBuilder, EntityLoader, EntityTypeGroup, IdentifierLoader, LoggingMonitor,
    MassIndexer, MassIndexingJob, MassIndexingMonitor, MassIndexingOptions, MassIndexingSummary,
    TypeGroup,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorState};
