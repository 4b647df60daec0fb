//! Error types for the search indexer repository.

mod backend_error;

pub use backend_error::BackendError;
