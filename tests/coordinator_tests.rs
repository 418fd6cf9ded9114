use async_trait::async_trait;
use stampede::cluster::protocol::PeerStatus;
use stampede::engine::{run_node, NodeError, NodeOptions};
use stampede::query::QueryBatch;
use stampede::target::{Connection, Target, TargetError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Target whose connections execute instantly-ish with a fixed latency,
/// counting every connect and execute across the pool.
struct FakeTarget {
    latency: Duration,
    connects: AtomicUsize,
    executes: Arc<AtomicU64>,
    /// Refuse the nth connect (1-based).
    refuse_connect: Option<usize>,
    /// Fail every execute after this many successes across all connections.
    fail_execute_after: Option<u64>,
}

impl FakeTarget {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            connects: AtomicUsize::new(0),
            executes: Arc::new(AtomicU64::new(0)),
            refuse_connect: None,
            fail_execute_after: None,
        }
    }
}

struct FakeConn {
    latency: Duration,
    executes: Arc<AtomicU64>,
    fail_execute_after: Option<u64>,
}

#[async_trait]
impl Target for FakeTarget {
    async fn connect(&self) -> Result<Box<dyn Connection>, TargetError> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refuse_connect == Some(n) {
            return Err(TargetError::Other("connection refused".to_string()));
        }
        Ok(Box::new(FakeConn {
            latency: self.latency,
            executes: Arc::clone(&self.executes),
            fail_execute_after: self.fail_execute_after,
        }))
    }
}

#[async_trait]
impl Connection for FakeConn {
    async fn execute(&mut self, _sql: &str) -> Result<(), TargetError> {
        let n = self.executes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.fail_execute_after {
            if n > limit {
                return Err(TargetError::Other("server went away".to_string()));
            }
        }
        tokio::time::sleep(self.latency).await;
        Ok(())
    }
}

fn batches(count: usize, rows: u64) -> Vec<QueryBatch> {
    (0..count)
        .map(|index| QueryBatch {
            index,
            rows,
            sql: format!("insert batch {}", index),
        })
        .collect()
}

#[tokio::test]
async fn test_two_second_scenario_with_four_workers() {
    // 4 workers, batch size 500, 10 batches, 2s run, ~1ms per batch.
    let target = FakeTarget::new(Duration::from_millis(1));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let opts = NodeOptions {
        workers: 4,
        duration: Duration::from_secs(2),
        report_every: 100,
    };

    let report = run_node(&target, batches(10, 500), &opts, tx).await.unwrap();

    // Workers only ever record whole batches.
    assert!(report.rows > 0);
    assert_eq!(report.rows % 500, 0);
    assert_eq!(target.connects.load(Ordering::SeqCst), 4);

    // Rows per second over the configured duration is total / 2.
    let rate = report.rows / 2;
    assert!(rate > 0);

    // The status stream ends with the finals and the terminal marker.
    let mut statuses = Vec::new();
    while let Ok(status) = rx.try_recv() {
        statuses.push(status);
    }
    let tail: Vec<_> = statuses.iter().rev().take(3).rev().cloned().collect();
    match &tail[..] {
        [PeerStatus::FinalTotal { rows, .. }, PeerStatus::FinalLatency { min_us, max_us }, PeerStatus::Done] =>
        {
            assert_eq!(*rows, report.rows);
            assert!(*min_us >= 1_000, "min latency below injected 1ms");
            assert!(max_us >= min_us);
        }
        other => panic!("unexpected status tail {:?}", other),
    }
    // Everything before the finals is live rates.
    for status in &statuses[..statuses.len() - 3] {
        assert!(matches!(status, PeerStatus::LiveRate { .. }));
    }
}

#[tokio::test]
async fn test_refused_connection_aborts_before_any_load() {
    let mut target = FakeTarget::new(Duration::ZERO);
    target.refuse_connect = Some(2);
    let (tx, _rx) = mpsc::unbounded_channel();
    let opts = NodeOptions {
        workers: 4,
        duration: Duration::from_secs(5),
        report_every: 100,
    };

    let err = run_node(&target, batches(8, 100), &opts, tx).await.unwrap_err();
    assert!(matches!(err, NodeError::Connect(_)));
    assert_eq!(target.executes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_worker_failure_invalidates_the_node_report() {
    let mut target = FakeTarget::new(Duration::from_millis(1));
    target.fail_execute_after = Some(5);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let opts = NodeOptions {
        workers: 2,
        duration: Duration::from_secs(30),
        report_every: 1_000_000,
    };

    let started = Instant::now();
    let err = run_node(&target, batches(4, 100), &opts, tx).await.unwrap_err();
    assert!(matches!(err, NodeError::Worker(_)));
    // The failure surfaces immediately instead of waiting out the duration.
    assert!(started.elapsed() < Duration::from_secs(10));

    // No finals and no terminal marker for an invalidated run.
    while let Ok(status) = rx.try_recv() {
        assert!(matches!(status, PeerStatus::LiveRate { .. }));
    }
}

#[tokio::test]
async fn test_worker_pool_shrinks_to_batch_count() {
    let target = FakeTarget::new(Duration::from_millis(1));
    let (tx, _rx) = mpsc::unbounded_channel();
    let opts = NodeOptions {
        workers: 8,
        duration: Duration::from_millis(200),
        report_every: 1_000_000,
    };

    run_node(&target, batches(3, 100), &opts, tx).await.unwrap();
    // One connection per shard, and no shard may be empty.
    assert_eq!(target.connects.load(Ordering::SeqCst), 3);
}
