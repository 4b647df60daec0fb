//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::IndexingError;

/// Install the global tracing subscriber. The filter comes from `RUST_LOG`
/// and defaults to `info`.
pub fn init_logging(format: LogFormat) -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| IndexingError::config(format!("Failed to initialize logging: {}", e)))
}
