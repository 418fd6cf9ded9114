use crate::cluster::protocol::PeerStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One worker's private counter slot.
///
/// Written only by the owning worker, read-merged by snapshot and report
/// calls, so concurrent `record` calls from distinct workers never contend
/// on the same memory.
#[derive(Debug)]
struct WorkerSlot {
    rows: AtomicU64,
    latency_total_us: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            rows: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
        }
    }
}

struct LastReport {
    at: Instant,
    rows: u64,
}

/// Thread-safe accumulator of per-worker throughput and latency counters.
///
/// Constructed once per benchmark run and shared by every worker on the
/// node. Only the "last reported" snapshot bookkeeping sits behind a mutex;
/// the hot `record` path touches nothing shared between workers except one
/// sample counter.
pub struct Analytics {
    slots: Vec<WorkerSlot>,
    samples: AtomicU64,
    report_every: u64,
    started: Instant,
    last_report: Mutex<LastReport>,
    status_tx: mpsc::UnboundedSender<PeerStatus>,
}

/// Final per-node summary. Valid once every worker has stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub rows: u64,
    pub latency_total: Duration,
    pub latency_min: Option<Duration>,
    pub latency_max: Option<Duration>,
    pub elapsed: Duration,
}

impl Analytics {
    pub fn new(
        workers: usize,
        report_every: u64,
        status_tx: mpsc::UnboundedSender<PeerStatus>,
    ) -> Self {
        let now = Instant::now();
        Self {
            slots: (0..workers).map(|_| WorkerSlot::new()).collect(),
            samples: AtomicU64::new(0),
            report_every: report_every.max(1),
            started: now,
            last_report: Mutex::new(LastReport { at: now, rows: 0 }),
            status_tx,
        }
    }

    /// Records one executed batch. Called only by the owning worker for
    /// `worker_id`; every Nth call across all workers emits a live
    /// throughput sample on the status channel.
    pub fn record(&self, batch_rows: u64, worker_id: usize, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        let slot = &self.slots[worker_id];
        slot.rows.fetch_add(batch_rows, Ordering::Relaxed);
        slot.latency_total_us.fetch_add(latency_us, Ordering::Relaxed);
        slot.latency_min_us.fetch_min(latency_us, Ordering::Relaxed);
        slot.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);

        let samples = self.samples.fetch_add(1, Ordering::Relaxed) + 1;
        if samples % self.report_every == 0 {
            self.live_sample();
        }
    }

    /// Instantaneous rate: rows since the last sample over wall-clock time
    /// since the last sample, not a cumulative average.
    fn live_sample(&self) {
        let mut last = self.last_report.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(last.at).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        let total = self.total_rows();
        let rate = ((total - last.rows) as f64 / elapsed) as u64;
        last.at = now;
        last.rows = total;
        drop(last);

        // A closed channel means the run is already tearing down.
        let _ = self.status_tx.send(PeerStatus::LiveRate { rows_per_sec: rate });
    }

    pub fn total_rows(&self) -> u64 {
        self.slots.iter().map(|s| s.rows.load(Ordering::Relaxed)).sum()
    }

    /// Reduces every worker slot into one summary. Min and max merge
    /// associatively, so the caller may merge node reports again at the
    /// cluster level.
    pub fn final_report(&self) -> NodeReport {
        let mut rows = 0u64;
        let mut latency_total_us = 0u64;
        let mut min_us = u64::MAX;
        let mut max_us = 0u64;
        for slot in &self.slots {
            rows += slot.rows.load(Ordering::Relaxed);
            latency_total_us += slot.latency_total_us.load(Ordering::Relaxed);
            min_us = min_us.min(slot.latency_min_us.load(Ordering::Relaxed));
            max_us = max_us.max(slot.latency_max_us.load(Ordering::Relaxed));
        }
        NodeReport {
            rows,
            latency_total: Duration::from_micros(latency_total_us),
            latency_min: (min_us != u64::MAX).then(|| Duration::from_micros(min_us)),
            latency_max: (max_us != 0).then(|| Duration::from_micros(max_us)),
            elapsed: self.started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics(workers: usize, report_every: u64) -> (Analytics, mpsc::UnboundedReceiver<PeerStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Analytics::new(workers, report_every, tx), rx)
    }

    #[test]
    fn test_final_report_sums_all_workers() {
        let (analytics, _rx) = analytics(3, 100);
        analytics.record(500, 0, Duration::from_millis(2));
        analytics.record(500, 1, Duration::from_millis(1));
        analytics.record(500, 2, Duration::from_millis(5));
        analytics.record(250, 1, Duration::from_millis(3));

        let report = analytics.final_report();
        assert_eq!(report.rows, 1_750);
        assert_eq!(report.latency_total, Duration::from_millis(11));
        assert_eq!(report.latency_min, Some(Duration::from_millis(1)));
        assert_eq!(report.latency_max, Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_final_report_with_no_samples() {
        let (analytics, _rx) = analytics(4, 100);
        let report = analytics.final_report();
        assert_eq!(report.rows, 0);
        assert_eq!(report.latency_min, None);
        assert_eq!(report.latency_max, None);
    }

    #[test]
    fn test_extrema_are_interleaving_independent() {
        // Same samples fed in two different per-worker orders give the same
        // summary: sum/min/max are associative and commutative.
        let samples = [(100u64, Duration::from_micros(900)),
            (100, Duration::from_micros(50)),
            (100, Duration::from_micros(4_000))];

        let (a, _rx) = analytics(2, 1_000);
        for (rows, lat) in samples {
            a.record(rows, 0, lat);
        }
        let (b, _rx2) = analytics(2, 1_000);
        for (rows, lat) in samples.iter().rev() {
            b.record(*rows, 1, *lat);
        }

        let ra = a.final_report();
        let rb = b.final_report();
        assert_eq!(ra.rows, rb.rows);
        assert_eq!(ra.latency_min, rb.latency_min);
        assert_eq!(ra.latency_max, rb.latency_max);
        assert_eq!(ra.latency_total, rb.latency_total);
    }

    #[test]
    fn test_live_samples_follow_the_cadence() {
        let (analytics, mut rx) = analytics(1, 10);
        for _ in 0..35 {
            std::thread::sleep(Duration::from_micros(100));
            analytics.record(100, 0, Duration::from_micros(100));
        }
        let mut emitted = 0;
        while let Ok(status) = rx.try_recv() {
            match status {
                PeerStatus::LiveRate { rows_per_sec } => {
                    emitted += 1;
                    // Rates can be huge in a tight loop but never negative
                    // or nonsensical for 3500 recorded rows.
                    assert!(rows_per_sec > 0);
                }
                other => panic!("unexpected status {:?}", other),
            }
        }
        assert_eq!(emitted, 3);
    }

    #[test]
    fn test_live_rate_tracks_injected_rate() {
        let (analytics, mut rx) = analytics(1, 10);
        // ~5ms per 100-row batch: about 20k rows/sec.
        for _ in 0..30 {
            std::thread::sleep(Duration::from_millis(5));
            analytics.record(100, 0, Duration::from_millis(5));
        }
        let mut rates = Vec::new();
        while let Ok(PeerStatus::LiveRate { rows_per_sec }) = rx.try_recv() {
            rates.push(rows_per_sec);
        }
        assert_eq!(rates.len(), 3);
        for rate in rates {
            assert!(
                (5_000..60_000).contains(&rate),
                "rate {} far from injected ~20k rows/sec",
                rate
            );
        }
    }

    #[test]
    fn test_concurrent_workers_never_lose_counts() {
        let (analytics, _rx) = analytics(8, 1_000_000);
        let analytics = std::sync::Arc::new(analytics);
        std::thread::scope(|scope| {
            for worker_id in 0..8 {
                let analytics = std::sync::Arc::clone(&analytics);
                scope.spawn(move || {
                    for i in 0..1_000u64 {
                        analytics.record(10, worker_id, Duration::from_micros(100 + i));
                    }
                });
            }
        });
        let report = analytics.final_report();
        assert_eq!(report.rows, 8 * 1_000 * 10);
        assert_eq!(report.latency_min, Some(Duration::from_micros(100)));
        assert_eq!(report.latency_max, Some(Duration::from_micros(1_099)));
    }
}
