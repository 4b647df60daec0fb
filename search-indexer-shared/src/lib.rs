//! # Search Indexer Shared
//!
//! Plain data types shared by the search indexer crates: document write
//! operations ([`Work`]), the references used to identify documents in
//! errors and reports, and the documents produced for mass indexing.

mod document;
mod work;

pub use document::IndexedDocument;
pub use work::{DocumentReference, Work, WorkOperation};
