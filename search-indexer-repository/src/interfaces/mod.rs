//! Interface definitions for the search backend.
//!
//! This module defines the abstract `SearchBackend` trait that allows
//! for dependency injection and swappable backend implementations.

mod search_backend;

pub use search_backend::SearchBackend;
