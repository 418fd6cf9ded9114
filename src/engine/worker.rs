use crate::engine::analytics::Analytics;
use crate::query::QueryBatch;
use crate::target::{Connection, TargetError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker {worker}: execute failed: {source}")]
    Execute {
        worker: usize,
        #[source]
        source: TargetError,
    },
}

/// One concurrent unit of load.
///
/// Cycles through its assigned batch subset until the stop signal flips,
/// timing every execute call and reporting it to the shared `Analytics`.
/// The stop signal is level-triggered and observed between iterations, so a
/// stopping worker finishes at most one in-flight execute and never starts
/// another batch.
pub struct Worker {
    id: usize,
    batches: Vec<QueryBatch>,
    analytics: Arc<Analytics>,
    stop: watch::Receiver<bool>,
}

impl Worker {
    /// `batches` is this worker's round-robin shard and must be non-empty.
    pub fn new(
        id: usize,
        batches: Vec<QueryBatch>,
        analytics: Arc<Analytics>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        debug_assert!(!batches.is_empty());
        Self {
            id,
            batches,
            analytics,
            stop,
        }
    }

    /// Drives the workload until stopped. The worker owns `conn` for its
    /// whole lifetime; every exit path releases it by drop, including an
    /// execute failure, which aborts this worker and surfaces to the
    /// coordinator without retry.
    pub async fn run(self, mut conn: Box<dyn Connection>) -> Result<(), WorkerError> {
        let mut idx = 0;
        let mut executed = 0u64;
        while !*self.stop.borrow() {
            let batch = &self.batches[idx];
            let started = Instant::now();
            conn.execute(&batch.sql)
                .await
                .map_err(|source| WorkerError::Execute {
                    worker: self.id,
                    source,
                })?;
            self.analytics.record(batch.rows, self.id, started.elapsed());
            idx = (idx + 1) % self.batches.len();
            executed += 1;
        }
        debug!(worker = self.id, executed, "Worker stopped");
        Ok(())
    }
}
