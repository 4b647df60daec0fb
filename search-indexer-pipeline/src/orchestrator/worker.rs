//! Partition worker: drains one queue into bulk requests.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::batcher::{Batcher, BatcherConfig, BulkRequest};
use crate::changeset::QueuedWork;
use crate::executor::BulkExecutor;

/// Consumes the works routed to one partition, in arrival order.
///
/// Requests of a partition are executed one at a time, which is what keeps
/// works sharing a routing key in submission order.
pub(crate) struct PartitionWorker {
    partition: usize,
    receiver: mpsc::Receiver<Vec<QueuedWork>>,
    batcher: Batcher,
    executor: Arc<BulkExecutor>,
    shutdown: CancellationToken,
}

impl PartitionWorker {
    pub(crate) fn new(
        partition: usize,
        receiver: mpsc::Receiver<Vec<QueuedWork>>,
        batcher: BatcherConfig,
        executor: Arc<BulkExecutor>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            partition,
            receiver,
            batcher: Batcher::new(batcher),
            executor,
            shutdown,
        }
    }

    /// Run until the queue is closed and empty.
    ///
    /// On shutdown the queue is closed to new submissions, and what was
    /// already admitted is still executed.
    #[instrument(skip(self), fields(partition = self.partition))]
    pub(crate) async fn run(mut self) {
        debug!("Partition worker started");
        let mut closing = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled(), if !closing => {
                    debug!("Closing partition queue");
                    self.receiver.close();
                    closing = true;
                    continue;
                }
                works = self.receiver.recv() => works,
            };

            match next {
                Some(works) => self.process(works).await,
                None => break,
            }
        }

        debug!("Partition worker stopped");
    }

    async fn process(&mut self, works: Vec<QueuedWork>) {
        self.enqueue(works).await;

        // Take changesets that are already waiting into the same requests.
        while let Ok(more) = self.receiver.try_recv() {
            self.enqueue(more).await;
        }

        if let Some(request) = self.batcher.flush() {
            self.execute(request).await;
        }
    }

    async fn enqueue(&mut self, works: Vec<QueuedWork>) {
        for work in works {
            if let Some(request) = self.batcher.push(work) {
                self.execute(request).await;
            }
        }
    }

    async fn execute(&self, request: BulkRequest) {
        debug!(works = request.len(), "Executing bulk request");
        self.executor.execute(request).await;
    }
}
