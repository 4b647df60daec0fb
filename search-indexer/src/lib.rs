//! # Search Indexer
//!
//! Entry point and configuration of the search indexer service.
//!
//! This crate reads settings from the environment, sets up logging and wires
//! the OpenSearch backend to the bulk write orchestrator.

pub mod config;

pub use config::{init_logging, Dependencies, LogFormat, Settings};

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Search backend error.
    #[error("Search error: {0}")]
    SearchError(#[from] search_indexer_repository::BackendError),

    /// Orchestrator error.
    #[error("Orchestrator error: {0}")]
    OrchestratorError(#[from] search_indexer_pipeline::OrchestratorError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
