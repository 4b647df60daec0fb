//! Backend error types.
//!
//! This module defines the error types that can occur while talking to the
//! search backend.

use thiserror::Error;

/// Errors that can occur during search backend operations.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Failed to establish or keep a connection to the backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The backend answered with a non-success HTTP status for the whole request.
    #[error("Request failed with status {status}: {body}")]
    StatusError { status: u16, body: String },

    /// Failed to parse a response from the backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An index administration call (create, delete, purge, refresh) failed.
    #[error("Index administration error on '{index}': {message}")]
    IndexAdminError { index: String, message: String },
}

impl BackendError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::StatusError {
            status,
            body: body.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create an index administration error.
    pub fn index_admin(index: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::IndexAdminError {
            index: index.into(),
            message: msg.into(),
        }
    }

    /// Whether the failure happened at the transport level and the request
    /// may be sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::ConnectionError(_) | BackendError::Timeout(_) => true,
            // Rate limiting and gateway/availability errors
            BackendError::StatusError { status, .. } => {
                matches!(status, 429 | 502 | 503 | 504)
            }
            BackendError::ParseError(_)
            | BackendError::SerializationError(_)
            | BackendError::IndexAdminError { .. } => false,
        }
    }
}

impl From<opensearch::Error> for BackendError {
    fn from(err: opensearch::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(err.to_string());
        }
        match err.status_code() {
            Some(status) => Self::status(status.as_u16(), err.to_string()),
            None => Self::ConnectionError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
