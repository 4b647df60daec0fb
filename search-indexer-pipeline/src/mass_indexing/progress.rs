//! Progress counters and periodic progress reports.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::monitor::MassIndexingMonitor;

/// Weight of the latest interval in the smoothed rate.
const RATE_SMOOTHING: f64 = 0.3;

/// Live counters of a mass indexing job.
///
/// `done` counts resolved works, successful or not, plus identifiers whose
/// entity no longer exists. `failed` counts entities that never became a
/// work because loading or building them failed.
#[derive(Debug)]
pub struct ProgressCounter {
    total: AtomicU64,
    total_known: AtomicBool,
    done: AtomicU64,
    failed: AtomicU64,
    started: Instant,
}

impl ProgressCounter {
    /// Create a counter starting now.
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            total_known: AtomicBool::new(true),
            done: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Add the expected count of a type group; `None` makes the total unknown.
    pub fn add_total(&self, count: Option<u64>) {
        match count {
            Some(count) => {
                self.total.fetch_add(count, Ordering::AcqRel);
            }
            None => self.total_known.store(false, Ordering::Release),
        }
    }

    /// Count resolved entities.
    pub fn add_done(&self, count: u64) {
        self.done.fetch_add(count, Ordering::AcqRel);
    }

    /// Count entities that failed before being submitted.
    pub fn add_failed(&self, count: u64) {
        self.failed.fetch_add(count, Ordering::AcqRel);
    }

    /// Current values.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let total = if self.total_known.load(Ordering::Acquire) {
            Some(self.total.load(Ordering::Acquire))
        } else {
            None
        };
        ProgressSnapshot {
            done: self.done.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            total,
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a [`ProgressCounter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Resolved entities.
    pub done: u64,
    /// Entities that failed before submission.
    pub failed: u64,
    /// Expected entities, if every type group could count them.
    pub total: Option<u64>,
    /// Time since the job started.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Entities that were handled one way or another.
    pub fn processed(&self) -> u64 {
        self.done + self.failed
    }

    /// Completion percentage, when the total is known and non-zero.
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.processed() as f64 * 100.0 / total as f64),
            _ => None,
        }
    }
}

/// A progress report handed to the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    /// Counter values.
    pub snapshot: ProgressSnapshot,
    /// Entities per second since the start.
    pub overall_rate: f64,
    /// Smoothed entities per second over recent intervals.
    pub current_rate: f64,
    /// Remaining time at the current rate.
    pub estimated_remaining: Option<Duration>,
}

/// Turns successive snapshots into reports with a smoothed rate.
#[derive(Debug, Default)]
pub(crate) struct RateEstimator {
    last_processed: u64,
    last_elapsed: Duration,
    smoothed: Option<f64>,
}

impl RateEstimator {
    pub(crate) fn report(&mut self, snapshot: ProgressSnapshot) -> ProgressReport {
        let processed = snapshot.processed();
        let elapsed_secs = snapshot.elapsed.as_secs_f64();
        let overall_rate = if elapsed_secs > 0.0 {
            processed as f64 / elapsed_secs
        } else {
            0.0
        };

        let window = snapshot.elapsed.saturating_sub(self.last_elapsed).as_secs_f64();
        if window > 0.0 {
            let instant = processed.saturating_sub(self.last_processed) as f64 / window;
            self.smoothed = Some(match self.smoothed {
                Some(previous) => RATE_SMOOTHING * instant + (1.0 - RATE_SMOOTHING) * previous,
                None => instant,
            });
            self.last_processed = processed;
            self.last_elapsed = snapshot.elapsed;
        }
        let current_rate = self.smoothed.unwrap_or(overall_rate);

        let estimated_remaining = match snapshot.total {
            Some(total) if current_rate > 0.0 => {
                let remaining = total.saturating_sub(processed) as f64;
                // Not representable after a long stall.
                Duration::try_from_secs_f64(remaining / current_rate).ok()
            }
            _ => None,
        };

        ProgressReport {
            snapshot,
            overall_rate,
            current_rate,
            estimated_remaining,
        }
    }
}

/// Report progress to the monitor every `interval` until `stop` is
/// cancelled, then once more with the final values.
pub(crate) fn spawn_progress_reporter(
    counter: Arc<ProgressCounter>,
    monitor: Arc<dyn MassIndexingMonitor>,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut estimator = RateEstimator::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip the immediate tick

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    monitor.progress(&estimator.report(counter.snapshot()));
                }
            }
        }

        monitor.progress(&estimator.report(counter.snapshot()));
    })
}
