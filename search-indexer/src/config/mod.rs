//! Configuration and dependency wiring for the search indexer.

mod dependencies;
mod logging;
mod settings;

pub use dependencies::Dependencies;
pub use logging::init_logging;
pub use settings::{LogFormat, Settings};
