//! # Search Indexer Repository
//!
//! This crate provides the backend side of the bulk write contract used by
//! the indexing pipeline. It includes definitions for errors, the
//! `SearchBackend` interface, the bulk line/result types, and a concrete
//! implementation for OpenSearch.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use config::BackendConfig;
pub use errors::BackendError;
pub use interfaces::SearchBackend;
pub use opensearch::OpenSearchBackend;
pub use types::{BulkAction, BulkItemError, BulkItemStatus, BulkLine};
