//! Bulk request lines and per-item results.
//!
//! A bulk request is a sequence of `(action-metadata, optional-payload)`
//! pairs; its response is one [`BulkItemStatus`] per line, in request order.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::BackendError;
use search_indexer_shared::{Work, WorkOperation};

/// The bulk action a line performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Create the document, failing with a conflict if it exists.
    Create,
    /// Index (create or replace) the document.
    Index,
    /// Partially update an existing document.
    Update,
    /// Delete the document.
    Delete,
}

impl BulkAction {
    /// Name of the action in the bulk protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Create => "create",
            BulkAction::Index => "index",
            BulkAction::Update => "update",
            BulkAction::Delete => "delete",
        }
    }
}

impl From<WorkOperation> for BulkAction {
    fn from(operation: WorkOperation) -> Self {
        match operation {
            WorkOperation::Add => BulkAction::Create,
            WorkOperation::Update => BulkAction::Update,
            WorkOperation::AddOrUpdate => BulkAction::Index,
            WorkOperation::Delete => BulkAction::Delete,
        }
    }
}

/// One line of a bulk request: action metadata and optional source.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLine {
    /// The action to perform.
    pub action: BulkAction,
    /// Target index.
    pub index: String,
    /// Document identifier.
    pub id: String,
    /// Optional routing value.
    pub routing: Option<String>,
    /// Document source (absent for deletes).
    pub payload: Option<Value>,
}

impl BulkLine {
    /// Action metadata object, e.g. `{"index": {"_index": "books", "_id": "1"}}`.
    pub fn metadata(&self) -> Value {
        let mut meta = serde_json::Map::new();
        meta.insert("_index".to_string(), json!(self.index));
        meta.insert("_id".to_string(), json!(self.id));
        if let Some(ref routing) = self.routing {
            meta.insert("routing".to_string(), json!(routing));
        }
        let mut action = serde_json::Map::new();
        action.insert(self.action.as_str().to_string(), Value::Object(meta));
        Value::Object(action)
    }

    /// Source line following the metadata, if the action carries one.
    pub fn source(&self) -> Option<Value> {
        match self.action {
            BulkAction::Delete => None,
            BulkAction::Update => self.payload.as_ref().map(|doc| json!({ "doc": doc })),
            BulkAction::Create | BulkAction::Index => self.payload.clone(),
        }
    }
}

impl TryFrom<&Work> for BulkLine {
    type Error = BackendError;

    fn try_from(work: &Work) -> Result<Self, Self::Error> {
        if work.operation.requires_payload() && work.payload.is_none() {
            return Err(BackendError::serialization(format!(
                "Missing payload for {} work on {}",
                work.operation,
                work.document()
            )));
        }

        Ok(BulkLine {
            action: work.operation.into(),
            index: work.index.clone(),
            id: work.document_id.clone(),
            routing: work.routing_key.clone(),
            payload: if work.operation.requires_payload() {
                work.payload.clone()
            } else {
                None
            },
        })
    }
}

/// Error details reported by the backend for one bulk item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemError {
    /// Error type, e.g. `version_conflict_engine_exception`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable reason.
    #[serde(default)]
    pub reason: String,
}

/// Outcome of one bulk line, positionally correlated with the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemStatus {
    /// HTTP status of the item.
    pub status: u16,
    /// Result keyword (`created`, `updated`, `deleted`, `not_found`, ...).
    #[serde(default)]
    pub result: Option<String>,
    /// Error details when the item failed.
    #[serde(default)]
    pub error: Option<BulkItemError>,
}

impl BulkItemStatus {
    /// A successful item with the given status and result.
    pub fn success(status: u16, result: impl Into<String>) -> Self {
        Self {
            status,
            result: Some(result.into()),
            error: None,
        }
    }

    /// A failed item.
    pub fn failure(status: u16, error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            result: None,
            error: Some(BulkItemError {
                error_type: error_type.into(),
                reason: reason.into(),
            }),
        }
    }

    /// Check if the item succeeded at the HTTP level.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.error.is_none()
    }
}
