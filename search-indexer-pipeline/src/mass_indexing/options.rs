//! Mass indexing job options.

use std::time::Duration;

use tracing::warn;

use crate::errors::MassIndexingError;

/// Options of a mass indexing job.
#[derive(Debug, Clone, PartialEq)]
pub struct MassIndexingOptions {
    /// Number of identifiers loaded, built and submitted together.
    pub batch_size: usize,
    /// Failures logged in detail before the rest are only counted.
    pub failure_flooding_threshold: u64,
    /// Abort the whole job on the first failure.
    pub fail_fast: bool,
    /// Drop and recreate every target index before indexing.
    pub drop_and_create_schema_on_start: bool,
    /// Remove every document from the target indexes before indexing.
    pub purge_all_on_start: bool,
    /// Refresh the target indexes once indexing is done.
    pub refresh_on_finish: bool,
    /// Number of type groups indexed concurrently.
    pub type_group_parallelism: usize,
    /// Interval between progress reports.
    pub progress_interval: Duration,
}

impl Default for MassIndexingOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            failure_flooding_threshold: 100,
            fail_fast: false,
            drop_and_create_schema_on_start: false,
            purge_all_on_start: true,
            refresh_on_finish: true,
            type_group_parallelism: 1,
            progress_interval: Duration::from_secs(10),
        }
    }
}

impl MassIndexingOptions {
    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the failure flooding threshold.
    pub fn with_failure_flooding_threshold(mut self, threshold: u64) -> Self {
        self.failure_flooding_threshold = threshold;
        self
    }

    /// Enable or disable fail-fast mode.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Enable or disable dropping and recreating indexes on start.
    pub fn with_drop_and_create_schema_on_start(mut self, enabled: bool) -> Self {
        self.drop_and_create_schema_on_start = enabled;
        self
    }

    /// Enable or disable purging indexes on start.
    pub fn with_purge_all_on_start(mut self, enabled: bool) -> Self {
        self.purge_all_on_start = enabled;
        self
    }

    /// Enable or disable the final refresh.
    pub fn with_refresh_on_finish(mut self, enabled: bool) -> Self {
        self.refresh_on_finish = enabled;
        self
    }

    /// Set how many type groups are indexed concurrently.
    pub fn with_type_group_parallelism(mut self, parallelism: usize) -> Self {
        self.type_group_parallelism = parallelism;
        self
    }

    /// Set the progress report interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Reject unusable options.
    pub fn validate(&self) -> Result<(), MassIndexingError> {
        if self.batch_size == 0 {
            return Err(MassIndexingError::invalid_options(
                "batch_size must be greater than zero",
            ));
        }
        if self.type_group_parallelism == 0 {
            return Err(MassIndexingError::invalid_options(
                "type_group_parallelism must be greater than zero",
            ));
        }
        if self.progress_interval.is_zero() {
            return Err(MassIndexingError::invalid_options(
                "progress_interval must be greater than zero",
            ));
        }
        if self.drop_and_create_schema_on_start && self.purge_all_on_start {
            warn!("Both drop_and_create_schema_on_start and purge_all_on_start are set; purging is redundant and will be skipped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = MassIndexingOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.batch_size, 100);
        assert!(options.purge_all_on_start);
        assert!(!options.fail_fast);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let result = MassIndexingOptions::default().with_batch_size(0).validate();
        assert!(matches!(result, Err(MassIndexingError::InvalidOptions(_))));

        let result = MassIndexingOptions::default()
            .with_type_group_parallelism(0)
            .validate();
        assert!(matches!(result, Err(MassIndexingError::InvalidOptions(_))));
    }
}
