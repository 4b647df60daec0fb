//! Bulk body serialization and response demultiplexing.
//!
//! The request body is newline-delimited JSON: one action-metadata line per
//! bulk line, followed by its source line when the action carries one. The
//! response `items` array holds one object per request line, keyed by the
//! action name.

use std::collections::BTreeMap;

use opensearch::http::request::JsonBody;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::BackendError;
use crate::types::{BulkItemStatus, BulkLine};

/// Bulk response body as returned by the `_bulk` endpoint.
#[derive(Debug, Deserialize)]
struct BulkResponseBody {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    items: Vec<BTreeMap<String, BulkItemStatus>>,
}

/// Build the NDJSON body for the given lines.
pub(crate) fn build_body(lines: &[BulkLine]) -> Vec<JsonBody<Value>> {
    let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(lines.len() * 2);
    for line in lines {
        body.push(line.metadata().into());
        if let Some(source) = line.source() {
            body.push(source.into());
        }
    }
    body
}

/// Extract one status per item, in response order.
pub(crate) fn parse_response(body: Value) -> Result<Vec<BulkItemStatus>, BackendError> {
    let parsed: BulkResponseBody = serde_json::from_value(body)
        .map_err(|e| BackendError::parse(format!("Invalid bulk response: {}", e)))?;

    tracing::trace!(took = parsed.took, errors = parsed.errors, "Parsed bulk response");

    parsed
        .items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            item.into_values().next().ok_or_else(|| {
                BackendError::parse(format!("Empty bulk response item at position {}", position))
            })
        })
        .collect()
}
