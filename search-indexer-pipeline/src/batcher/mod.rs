//! Groups queued works into bulk requests.
//!
//! A request is cut when it reaches `max_bulk_actions` works, or when adding
//! the next work would push it over `max_bulk_bytes`. A single work larger
//! than the byte limit is still sent, alone.

use search_indexer_shared::Work;

use crate::changeset::QueuedWork;

/// Default maximum number of works per bulk request.
pub const DEFAULT_MAX_BULK_ACTIONS: usize = 1000;

/// Default maximum estimated body size of a bulk request.
pub const DEFAULT_MAX_BULK_BYTES: usize = 5 * 1024 * 1024;

/// Thresholds applied by the [`Batcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Maximum number of works per request.
    pub max_bulk_actions: usize,
    /// Maximum estimated request body size in bytes.
    pub max_bulk_bytes: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_bulk_actions: DEFAULT_MAX_BULK_ACTIONS,
            max_bulk_bytes: DEFAULT_MAX_BULK_BYTES,
        }
    }
}

/// A group of works sent to the backend in one round-trip.
#[derive(Debug)]
pub struct BulkRequest {
    pub(crate) works: Vec<QueuedWork>,
    estimated_bytes: usize,
}

impl BulkRequest {
    /// Number of works in the request.
    pub fn len(&self) -> usize {
        self.works.len()
    }

    /// Check if the request is empty.
    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    /// Estimated body size in bytes.
    pub fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    /// The works of the request, in queue order.
    pub fn works(&self) -> impl Iterator<Item = &Work> {
        self.works.iter().map(QueuedWork::work)
    }
}

/// Accumulates works until a threshold is reached.
#[derive(Debug)]
pub struct Batcher {
    config: BatcherConfig,
    pending: Vec<QueuedWork>,
    pending_bytes: usize,
}

impl Batcher {
    /// Create a batcher. Zero thresholds are treated as one.
    pub fn new(config: BatcherConfig) -> Self {
        let config = BatcherConfig {
            max_bulk_actions: config.max_bulk_actions.max(1),
            max_bulk_bytes: config.max_bulk_bytes.max(1),
        };
        Self {
            config,
            pending: Vec::with_capacity(config.max_bulk_actions.min(DEFAULT_MAX_BULK_ACTIONS)),
            pending_bytes: 0,
        }
    }

    /// Append a work. Returns a request when a threshold was reached.
    pub(crate) fn push(&mut self, work: QueuedWork) -> Option<BulkRequest> {
        let size = work.work().estimated_size();

        let mut ready = None;
        if !self.pending.is_empty()
            && (self.pending.len() >= self.config.max_bulk_actions
                || self.pending_bytes + size > self.config.max_bulk_bytes)
        {
            ready = self.take();
        }

        self.pending.push(work);
        self.pending_bytes += size;

        if ready.is_none() && self.pending.len() >= self.config.max_bulk_actions {
            ready = self.take();
        }
        ready
    }

    /// Take whatever is pending as a request.
    pub fn flush(&mut self) -> Option<BulkRequest> {
        self.take()
    }

    /// Number of works waiting.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> Option<BulkRequest> {
        if self.pending.is_empty() {
            return None;
        }
        let works = std::mem::take(&mut self.pending);
        let estimated_bytes = std::mem::replace(&mut self.pending_bytes, 0);
        Some(BulkRequest {
            works,
            estimated_bytes,
        })
    }
}
