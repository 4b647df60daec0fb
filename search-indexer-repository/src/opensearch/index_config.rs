//! Index settings and mappings used when (re)creating indexes.

use std::collections::HashMap;

use serde_json::{json, Value};

/// Settings applied to an index that has no registered schema.
///
/// - 1 primary shard
/// - 1 replica for redundancy
pub fn default_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        }
    })
}

/// Registry of index creation bodies (settings and mappings), keyed by index name.
#[derive(Debug, Clone, Default)]
pub struct IndexSchemas {
    schemas: HashMap<String, Value>,
}

impl IndexSchemas {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the creation body for an index.
    pub fn with_schema(mut self, index: impl Into<String>, body: Value) -> Self {
        self.schemas.insert(index.into(), body);
        self
    }

    /// The creation body for the index, or the default settings.
    pub fn creation_body(&self, index: &str) -> Value {
        self.schemas
            .get(index)
            .cloned()
            .unwrap_or_else(default_index_settings)
    }
}
