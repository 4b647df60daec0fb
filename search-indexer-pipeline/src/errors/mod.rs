//! Error types for the indexing pipeline.

mod load_error;
mod mass_indexing_error;
mod orchestrator_error;
mod work_error;

pub use load_error::{DocumentBuildError, LoadError};
pub use mass_indexing_error::MassIndexingError;
pub use orchestrator_error::OrchestratorError;
pub use work_error::WorkError;
