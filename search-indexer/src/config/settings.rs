//! Service settings read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use search_indexer_pipeline::{BatcherConfig, OrchestratorConfig, RetryPolicy};
use search_indexer_repository::config::DEFAULT_URL;
use search_indexer_repository::BackendConfig;

use crate::IndexingError;

/// Default time given to queued works on shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = IndexingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(IndexingError::config(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                other
            ))),
        }
    }
}

/// Settings of the search indexer service.
#[derive(Debug, Clone)]
pub struct Settings {
    /// OpenSearch connection.
    pub backend: BackendConfig,
    /// Orchestrator sizing, batching and retries.
    pub orchestrator: OrchestratorConfig,
    /// Time given to queued works when shutting down.
    pub shutdown_timeout: Duration,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Settings {
    /// Read settings from the environment, after loading `.env` if present.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `ORCHESTRATOR_QUEUE_COUNT`: number of partitions (default: 1)
    /// - `ORCHESTRATOR_QUEUE_CAPACITY`: capacity of each partition queue (default: 1000)
    /// - `BULK_MAX_ACTIONS`: works per bulk request (default: 1000)
    /// - `BULK_MAX_BYTES`: estimated bytes per bulk request (default: 5 MiB)
    /// - `BULK_MAX_RETRIES`: retries of a failed bulk request (default: 3)
    /// - `SHUTDOWN_TIMEOUT_SECS`: drain timeout on shutdown (default: 30)
    /// - `LOG_FORMAT`: `text` or `json` (default: text)
    pub fn from_env() -> Result<Self, IndexingError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = OrchestratorConfig::default();
        let batcher_defaults = BatcherConfig::default();
        let retry_defaults = RetryPolicy::default();

        let url = lookup("OPENSEARCH_URL").unwrap_or_else(|| DEFAULT_URL.to_string());

        let orchestrator = OrchestratorConfig {
            queue_count: positive(&lookup, "ORCHESTRATOR_QUEUE_COUNT", defaults.queue_count)?,
            queue_capacity: positive(
                &lookup,
                "ORCHESTRATOR_QUEUE_CAPACITY",
                defaults.queue_capacity,
            )?,
            batcher: BatcherConfig {
                max_bulk_actions: positive(
                    &lookup,
                    "BULK_MAX_ACTIONS",
                    batcher_defaults.max_bulk_actions,
                )?,
                max_bulk_bytes: positive(&lookup, "BULK_MAX_BYTES", batcher_defaults.max_bulk_bytes)?,
            },
            retry: RetryPolicy {
                max_retries: parse(&lookup, "BULK_MAX_RETRIES", retry_defaults.max_retries)?,
                ..retry_defaults
            },
        };

        let shutdown_timeout = Duration::from_secs(parse(
            &lookup,
            "SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        )?);

        let log_format = match lookup("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            backend: BackendConfig::new(url),
            orchestrator,
            shutdown_timeout,
            log_format,
        })
    }
}

fn parse<T, F>(lookup: &F, name: &str, default: T) -> Result<T, IndexingError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|e| {
            IndexingError::config(format!("Invalid value '{}' for {}: {}", value, name, e))
        }),
        None => Ok(default),
    }
}

fn positive<F>(lookup: &F, name: &str, default: usize) -> Result<usize, IndexingError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse(lookup, name, default)?;
    if value == 0 {
        return Err(IndexingError::config(format!("{} must be greater than zero", name)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, IndexingError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.backend.url, DEFAULT_URL);
        assert_eq!(settings.orchestrator.queue_count, 1);
        assert_eq!(settings.orchestrator.queue_capacity, 1000);
        assert_eq!(settings.orchestrator.batcher, BatcherConfig::default());
        assert_eq!(settings.orchestrator.retry.max_retries, 3);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(settings.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("OPENSEARCH_URL", "http://search:9200"),
            ("ORCHESTRATOR_QUEUE_COUNT", "4"),
            ("BULK_MAX_ACTIONS", "250"),
            ("BULK_MAX_RETRIES", "0"),
            ("SHUTDOWN_TIMEOUT_SECS", "5"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(settings.backend.url, "http://search:9200");
        assert_eq!(settings.orchestrator.queue_count, 4);
        assert_eq!(settings.orchestrator.batcher.max_bulk_actions, 250);
        assert_eq!(settings.orchestrator.retry.max_retries, 0);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(matches!(
            settings(&[("BULK_MAX_BYTES", "lots")]),
            Err(IndexingError::ConfigError(_))
        ));
        assert!(matches!(
            settings(&[("ORCHESTRATOR_QUEUE_COUNT", "0")]),
            Err(IndexingError::ConfigError(_))
        ));
        assert!(matches!(
            settings(&[("LOG_FORMAT", "xml")]),
            Err(IndexingError::ConfigError(_))
        ));
    }
}
