//! Documents produced from entities during mass indexing.

use serde_json::Value;

use crate::work::Work;

/// A document built from an entity, ready to be turned into a [`Work`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    /// Document identifier.
    pub id: String,
    /// Optional routing key.
    pub routing_key: Option<String>,
    /// Document source.
    pub payload: Value,
}

impl IndexedDocument {
    /// Create a document without routing key.
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            routing_key: None,
            payload,
        }
    }

    /// Set the routing key.
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// Turn the document into an add-or-update work for the given index.
    pub fn into_work(self, index: &str) -> Work {
        let work = Work::add_or_update(index, self.id, self.payload);
        match self.routing_key {
            Some(routing_key) => work.with_routing_key(routing_key),
            None => work,
        }
    }
}
