//! Observation hooks for mass indexing jobs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::progress::ProgressReport;

/// Where a type group stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeGroupPhase {
    /// Counting and streaming identifiers.
    IdentifierLoading,
    /// Loading entities for a batch of identifiers.
    EntityLoading,
    /// Building documents and waiting for their works.
    DocumentBuildingAndSubmitting,
    /// Every identifier was processed.
    Done,
    /// The type group stopped on a failure.
    Failed,
    /// The type group was interrupted.
    Interrupted,
}

/// Final state of one type group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeGroupStatus {
    /// Type group name.
    pub name: String,
    /// Phase reached.
    pub phase: TypeGroupPhase,
    /// Documents applied by the backend.
    pub documents_indexed: u64,
    /// Failures recorded for this type group.
    pub failures: u64,
}

/// Outcome of a mass indexing job.
#[derive(Debug, Clone, PartialEq)]
pub struct MassIndexingSummary {
    /// When the job started.
    pub started_at: DateTime<Utc>,
    /// How long the job ran.
    pub elapsed: Duration,
    /// Documents applied by the backend, across type groups.
    pub documents_indexed: u64,
    /// Failures recorded, including those past the flooding threshold.
    pub failures: u64,
    /// Per type group outcome, ordered by name.
    pub type_groups: Vec<TypeGroupStatus>,
}

/// Receives progress and completion notifications of a mass indexing job.
pub trait MassIndexingMonitor: Send + Sync {
    /// Periodic progress.
    fn progress(&self, report: &ProgressReport);

    /// A type group stopped.
    fn type_group_finished(&self, _status: &TypeGroupStatus) {}

    /// The job ended, successfully or not.
    fn finished(&self, summary: &MassIndexingSummary);
}

/// Monitor writing everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMonitor;

impl MassIndexingMonitor for LoggingMonitor {
    fn progress(&self, report: &ProgressReport) {
        let snapshot = &report.snapshot;
        info!(
            done = snapshot.done,
            failed = snapshot.failed,
            total = ?snapshot.total,
            percent = ?snapshot.percent().map(|p| (p * 10.0).round() / 10.0),
            rate = format!("{:.1}/s", report.current_rate),
            overall_rate = format!("{:.1}/s", report.overall_rate),
            eta_secs = ?report.estimated_remaining.map(|d| d.as_secs()),
            "Mass indexing progress"
        );
    }

    fn type_group_finished(&self, status: &TypeGroupStatus) {
        match status.phase {
            TypeGroupPhase::Done => info!(
                type_group = %status.name,
                documents = status.documents_indexed,
                failures = status.failures,
                "Type group indexed"
            ),
            phase => warn!(
                type_group = %status.name,
                phase = ?phase,
                documents = status.documents_indexed,
                failures = status.failures,
                "Type group stopped before completion"
            ),
        }
    }

    fn finished(&self, summary: &MassIndexingSummary) {
        info!(
            documents = summary.documents_indexed,
            failures = summary.failures,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            started_at = %summary.started_at,
            "Mass indexing finished"
        );
    }
}
