//! Document-level write operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed per-work overhead added to the payload size when estimating the
/// size of the bulk line (action metadata, separators).
const ACTION_LINE_OVERHEAD: usize = 64;

/// The kind of write a [`Work`] performs on its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOperation {
    /// Create the document; fails if it already exists.
    Add,
    /// Partially update an existing document.
    Update,
    /// Create the document or replace it entirely.
    AddOrUpdate,
    /// Delete the document.
    Delete,
}

impl WorkOperation {
    /// Whether works of this kind carry a document payload.
    pub fn requires_payload(&self) -> bool {
        !matches!(self, WorkOperation::Delete)
    }

    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOperation::Add => "add",
            WorkOperation::Update => "update",
            WorkOperation::AddOrUpdate => "add_or_update",
            WorkOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for WorkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one document in one index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentReference {
    /// Target index name.
    pub index: String,
    /// Document identifier within the index.
    pub id: String,
}

impl DocumentReference {
    /// Create a reference to the given document.
    pub fn new(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.id)
    }
}

/// A single document write operation targeting one index, one document id
/// and one routing key.
///
/// Works are created by change tracking or by mass indexing and are not
/// modified afterwards; they are moved into a changeset for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    /// Target index name.
    pub index: String,
    /// Document identifier.
    pub document_id: String,
    /// Routing key; when absent the document id is used for ordering.
    pub routing_key: Option<String>,
    /// The write to perform.
    pub operation: WorkOperation,
    /// Document source for add/update operations.
    pub payload: Option<Value>,
}

impl Work {
    fn new(
        index: impl Into<String>,
        document_id: impl Into<String>,
        operation: WorkOperation,
        payload: Option<Value>,
    ) -> Self {
        Self {
            index: index.into(),
            document_id: document_id.into(),
            routing_key: None,
            operation,
            payload,
        }
    }

    /// Create an add work.
    pub fn add(index: impl Into<String>, document_id: impl Into<String>, payload: Value) -> Self {
        Self::new(index, document_id, WorkOperation::Add, Some(payload))
    }

    /// Create a partial update work.
    pub fn update(
        index: impl Into<String>,
        document_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::new(index, document_id, WorkOperation::Update, Some(payload))
    }

    /// Create an add-or-update (replace) work.
    pub fn add_or_update(
        index: impl Into<String>,
        document_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::new(index, document_id, WorkOperation::AddOrUpdate, Some(payload))
    }

    /// Create a delete work.
    pub fn delete(index: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self::new(index, document_id, WorkOperation::Delete, None)
    }

    /// Set the routing key.
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// Reference to the targeted document.
    pub fn document(&self) -> DocumentReference {
        DocumentReference::new(self.index.clone(), self.document_id.clone())
    }

    /// The key whose works must be applied in submission order.
    pub fn ordering_key(&self) -> &str {
        self.routing_key.as_deref().unwrap_or(&self.document_id)
    }

    /// Approximate number of bytes this work adds to a bulk request body.
    pub fn estimated_size(&self) -> usize {
        let payload = self
            .payload
            .as_ref()
            .and_then(|p| serde_json::to_vec(p).ok())
            .map(|bytes| bytes.len())
            .unwrap_or(0);
        let routing = self.routing_key.as_ref().map(String::len).unwrap_or(0);

        ACTION_LINE_OVERHEAD + self.index.len() + self.document_id.len() + routing + payload
    }
}
