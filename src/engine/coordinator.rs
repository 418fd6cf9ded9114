use crate::cluster::protocol::PeerStatus;
use crate::engine::analytics::{Analytics, NodeReport};
use crate::engine::worker::{Worker, WorkerError};
use crate::query::QueryBatch;
use crate::target::{Target, TargetError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no batches to run")]
    NoBatches,

    #[error("connection acquisition failed: {0}")]
    Connect(#[source] TargetError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("worker task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub workers: usize,
    pub duration: Duration,
    /// Emit a live throughput sample every N recorded operations.
    pub report_every: u64,
}

/// Runs one full benchmark pass on this machine.
///
/// Batches are sharded round-robin across the worker pool; every connection
/// is acquired up front so a refused connection aborts before any load
/// starts. After the configured duration the stop signal is raised and every
/// worker is awaited. Any worker failure invalidates this node's numbers and
/// propagates instead of reporting a partial total.
///
/// Behavior is identical whether this process is the operator-invoked master
/// or a remotely spawned peer; only the consumer of `status_tx` differs.
pub async fn run_node(
    target: &dyn Target,
    batches: Vec<QueryBatch>,
    opts: &NodeOptions,
    status_tx: mpsc::UnboundedSender<PeerStatus>,
) -> Result<NodeReport, NodeError> {
    if batches.is_empty() {
        return Err(NodeError::NoBatches);
    }

    // Clamp so every shard is non-empty.
    let workers = opts.workers.clamp(1, batches.len());
    if workers < opts.workers {
        warn!(
            requested = opts.workers,
            workers, "Fewer batches than workers, shrinking the pool"
        );
    }

    let batch_count = batches.len();
    let mut shards: Vec<Vec<QueryBatch>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, batch) in batches.into_iter().enumerate() {
        shards[i % workers].push(batch);
    }

    let mut conns = Vec::with_capacity(workers);
    for _ in 0..workers {
        conns.push(target.connect().await.map_err(NodeError::Connect)?);
    }

    let analytics = Arc::new(Analytics::new(workers, opts.report_every, status_tx.clone()));
    let (stop_tx, stop_rx) = watch::channel(false);

    info!(workers, batches = batch_count, "Launching workers");
    let mut pool = JoinSet::new();
    for (id, (shard, conn)) in shards.into_iter().zip(conns).enumerate() {
        let worker = Worker::new(id, shard, Arc::clone(&analytics), stop_rx.clone());
        pool.spawn(worker.run(conn));
    }

    // Let the workload run. A worker finishing before the deadline can only
    // mean it failed; the stop signal has not been raised yet.
    let mut failure: Option<NodeError> = None;
    let sleep = tokio::time::sleep(opts.duration);
    tokio::pin!(sleep);
    tokio::select! {
        _ = &mut sleep => {}
        Some(result) = pool.join_next() => {
            match result {
                Ok(Ok(())) => warn!("Worker exited before the stop signal"),
                Ok(Err(e)) => failure = Some(e.into()),
                Err(e) => failure = Some(e.into()),
            }
        }
    }

    debug!("Stopping workload");
    let _ = stop_tx.send(true);
    while let Some(result) = pool.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if failure.is_none() {
                    failure = Some(e.into());
                }
            }
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e.into());
                }
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    let report = analytics.final_report();
    emit_finals(&status_tx, &report);
    Ok(report)
}

/// Publishes the final numbers followed by the terminal marker.
fn emit_finals(status_tx: &mpsc::UnboundedSender<PeerStatus>, report: &NodeReport) {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "localhost".to_string());
    let _ = status_tx.send(PeerStatus::FinalTotal {
        host,
        rows: report.rows,
    });
    if let (Some(min), Some(max)) = (report.latency_min, report.latency_max) {
        let _ = status_tx.send(PeerStatus::FinalLatency {
            min_us: min.as_micros() as u64,
            max_us: max.as_micros() as u64,
        });
    }
    let _ = status_tx.send(PeerStatus::Done);
}
