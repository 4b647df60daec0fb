//! Configuration types for the search backend client.

use std::time::Duration;

/// Default OpenSearch URL.
pub const DEFAULT_URL: &str = "http://localhost:9200";

/// Configuration for the backend client.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the cluster.
    pub url: String,
    /// Timeout applied to every HTTP request.
    /// Set to None to rely on the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl BackendConfig {
    /// Create a config for the given URL with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
