//! OpenSearch implementation of the search backend.
//!
//! This module provides a concrete implementation of `SearchBackend`
//! using OpenSearch as the backend.

mod bulk;
mod client;
mod index_config;

pub use client::OpenSearchBackend;
pub use index_config::{default_index_settings, IndexSchemas};
