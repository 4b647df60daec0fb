//! Errors raised by the loaders and builders plugged into mass indexing.

use thiserror::Error;

/// Errors returned by identifier and entity loaders.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The identifier source failed.
    #[error("Identifier loading failed: {0}")]
    Identifiers(String),

    /// Loading entities failed.
    #[error("Entity loading failed: {0}")]
    Entities(String),

    /// The loader cannot load entities one by one.
    #[error("Loading a single entity is not supported by this loader")]
    Unsupported,
}

impl LoadError {
    /// Create an identifier loading error.
    pub fn identifiers(msg: impl Into<String>) -> Self {
        Self::Identifiers(msg.into())
    }

    /// Create an entity loading error.
    pub fn entities(msg: impl Into<String>) -> Self {
        Self::Entities(msg.into())
    }
}

/// A document builder could not produce a document from an entity.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to build document for entity {entity_id}: {message}")]
pub struct DocumentBuildError {
    /// Identifier of the entity.
    pub entity_id: String,
    /// What went wrong.
    pub message: String,
}

impl DocumentBuildError {
    /// Create a build error for the given entity.
    pub fn new(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }
}
