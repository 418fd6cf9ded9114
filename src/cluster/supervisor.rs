use crate::cluster::launch::{launch_peer, LaunchError, PeerCommand};
use crate::cluster::protocol::{format_latency_ms, group_digits, PeerStatus};
use crate::config::{PeerConfig, SshConfig};
use crate::engine::analytics::NodeReport;
use crate::engine::coordinator::{run_node, NodeError, NodeOptions};
use crate::query::QueryBatch;
use crate::target::Target;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("peers never completed: {}", .0.join(", "))]
    Incomplete(Vec<String>),
}

/// Final merged view across the fleet. Built exactly once, after every peer
/// has reported its terminal marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterReport {
    pub total_rows: u64,
    pub duration: Duration,
    pub rows_per_sec: u64,
    pub latency_min: Option<Duration>,
    pub latency_max: Option<Duration>,
}

impl ClusterReport {
    /// A single-node run is a cluster of one.
    pub fn from_node(report: &NodeReport, duration: Duration) -> Self {
        Self {
            total_rows: report.rows,
            duration,
            rows_per_sec: rate(report.rows, duration),
            latency_min: report.latency_min,
            latency_max: report.latency_max,
        }
    }

    pub fn print(&self) {
        println!("{} rows in total", group_digits(self.total_rows));
        println!("{} rows per second", group_digits(self.rows_per_sec));
        if let Some(min) = self.latency_min {
            println!("Min query latency: {}", format_latency_ms(min));
        }
        if let Some(max) = self.latency_max {
            println!("Max query latency: {}", format_latency_ms(max));
        }
    }
}

fn rate(rows: u64, duration: Duration) -> u64 {
    let secs = duration.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (rows as f64 / secs) as u64
}

/// One parsed status message attributed to the peer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    pub peer: String,
    pub status: PeerStatus,
}

/// Forwards parsed status lines from one peer's byte stream into the shared
/// event channel. One reader task per peer keeps a slow stream from ever
/// blocking another peer's progress.
///
/// Unparseable lines are logged and skipped; whether a stream that closes
/// without a terminal marker is fatal is the merge loop's call.
pub fn spawn_peer_reader<R>(
    peer: String,
    reader: R,
    tx: mpsc::UnboundedSender<PeerEvent>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match PeerStatus::parse_line(&line) {
                        Ok(status) => {
                            if tx
                                .send(PeerEvent {
                                    peer: peer.clone(),
                                    status,
                                })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!(peer = %peer, error = %e, "Skipping unparseable status line"),
                    }
                }
                Ok(None) => {
                    debug!(peer = %peer, "Peer stream closed");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Peer stream read failed");
                    break;
                }
            }
        }
    })
}

struct PeerProgress {
    done: bool,
    pending_rate: Option<u64>,
}

/// Consumes interleaved peer events until every peer has produced its
/// terminal marker, merging as it goes.
///
/// Live-rate samples are summed and displayed once a complete set (one per
/// unfinished peer) has arrived or on the wall-clock flush cadence,
/// whichever comes first. The wait is bounded: if the limit expires, or
/// every stream closes early, the unfinished peers are named in the error —
/// this loop never hangs on a dead peer.
pub async fn merge_peer_events(
    mut rx: mpsc::UnboundedReceiver<PeerEvent>,
    peer_ids: &[String],
    run_duration: Duration,
    wait_limit: Duration,
    flush_interval: Duration,
) -> Result<ClusterReport, ClusterError> {
    let mut progress: BTreeMap<String, PeerProgress> = peer_ids
        .iter()
        .map(|id| {
            (
                id.clone(),
                PeerProgress {
                    done: false,
                    pending_rate: None,
                },
            )
        })
        .collect();

    let mut total_rows = 0u64;
    let mut min_us = u64::MAX;
    let mut max_us = 0u64;

    let deadline = tokio::time::sleep(wait_limit);
    tokio::pin!(deadline);
    let mut flush = tokio::time::interval(flush_interval);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(PeerEvent { peer, status }) => {
                    let Some(state) = progress.get_mut(&peer) else {
                        warn!(peer = %peer, "Status from unknown peer");
                        continue;
                    };
                    match status {
                        PeerStatus::LiveRate { rows_per_sec } => {
                            state.pending_rate = Some(rows_per_sec);
                            let unfinished = progress.values().filter(|p| !p.done).count();
                            let sampled = progress
                                .values()
                                .filter(|p| !p.done && p.pending_rate.is_some())
                                .count();
                            if unfinished > 0 && sampled == unfinished {
                                flush_rates(&mut progress);
                            }
                        }
                        PeerStatus::FinalTotal { host, rows } => {
                            info!(peer = %peer, host = %host, rows, "Peer reported final total");
                            total_rows += rows;
                        }
                        PeerStatus::FinalLatency { min_us: min, max_us: max } => {
                            min_us = min_us.min(min);
                            max_us = max_us.max(max);
                        }
                        PeerStatus::Done => {
                            debug!(peer = %peer, "Peer finished");
                            state.done = true;
                            if progress.values().all(|p| p.done) {
                                break;
                            }
                        }
                    }
                }
                // Every stream closed; anything not done never will be.
                None => return Err(ClusterError::Incomplete(unfinished_peers(&progress))),
            },
            _ = flush.tick() => flush_rates(&mut progress),
            _ = &mut deadline => {
                warn!(limit = ?wait_limit, "Gave up waiting for peers");
                return Err(ClusterError::Incomplete(unfinished_peers(&progress)));
            }
        }
    }

    Ok(ClusterReport {
        total_rows,
        duration: run_duration,
        rows_per_sec: rate(total_rows, run_duration),
        latency_min: (min_us != u64::MAX).then(|| Duration::from_micros(min_us)),
        latency_max: (max_us != 0).then(|| Duration::from_micros(max_us)),
    })
}

fn unfinished_peers(progress: &BTreeMap<String, PeerProgress>) -> Vec<String> {
    progress
        .iter()
        .filter(|(_, p)| !p.done)
        .map(|(id, _)| id.clone())
        .collect()
}

fn flush_rates(progress: &mut BTreeMap<String, PeerProgress>) {
    let mut sum = 0u64;
    let mut sampled = false;
    for state in progress.values_mut() {
        if let Some(rate) = state.pending_rate.take() {
            sum += rate;
            sampled = true;
        }
    }
    if sampled {
        println!("Current upsert throughput: {} rows / s", group_digits(sum));
    }
}

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub node: NodeOptions,
    /// Wall-clock cadence for flushing the merged cluster rate.
    pub flush_interval: Duration,
    /// Extra time peers get to report their finals after the run duration.
    pub grace: Duration,
}

/// Fans the benchmark out to every configured peer plus the local node and
/// merges their status streams into one ClusterReport.
///
/// The local Node Coordinator is just one more peer: its status updates feed
/// the same event channel the remote readers feed, and its `Done` counts
/// toward termination like any other terminal marker.
pub async fn run_cluster(
    target: Arc<dyn Target>,
    batches: Vec<QueryBatch>,
    peers: &[PeerConfig],
    ssh: &SshConfig,
    peer_command: &PeerCommand,
    opts: &ClusterOptions,
) -> Result<ClusterReport, ClusterError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut children = Vec::with_capacity(peers.len());
    let mut peer_ids = Vec::with_capacity(peers.len() + 1);

    for peer in peers {
        let (process, stdout) = launch_peer(ssh, peer, peer_command)?;
        spawn_peer_reader(process.id.clone(), stdout, tx.clone());
        peer_ids.push(process.id.clone());
        children.push(process);
    }

    // The local node is one more peer feeding the same channel.
    let local_id = "local".to_string();
    peer_ids.push(local_id.clone());
    let (local_tx, mut local_rx) = mpsc::unbounded_channel::<PeerStatus>();
    {
        let tx = tx.clone();
        let local_id = local_id.clone();
        tokio::spawn(async move {
            while let Some(status) = local_rx.recv().await {
                if tx.send(PeerEvent {
                    peer: local_id.clone(),
                    status,
                })
                .is_err()
                {
                    break;
                }
            }
        });
    }
    let node_opts = opts.node.clone();
    let node_target = Arc::clone(&target);
    let mut node_handle = Some(tokio::spawn(async move {
        run_node(node_target.as_ref(), batches, &node_opts, local_tx).await
    }));

    // Only reader tasks and the local forwarder may keep the channel open.
    drop(tx);

    let wait_limit = opts.node.duration + opts.grace;
    let merge = merge_peer_events(rx, &peer_ids, opts.node.duration, wait_limit, opts.flush_interval);
    tokio::pin!(merge);

    // Merge while watching the local node so a local worker failure aborts
    // the run immediately instead of waiting out the grace period.
    let merged = loop {
        match node_handle.take() {
            Some(mut handle) => tokio::select! {
                merged = &mut merge => {
                    node_handle = Some(handle);
                    break merged;
                }
                result = &mut handle => {
                    match result {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            abort_children(&mut children);
                            return Err(e.into());
                        }
                        Err(e) => {
                            abort_children(&mut children);
                            return Err(e.into());
                        }
                    }
                }
            },
            None => break merge.as_mut().await,
        }
    };

    // When the merge gives up, the local node may still be wedged inside an
    // execute call; abort it rather than hang the supervisor on join.
    if let Some(handle) = node_handle.take() {
        if merged.is_err() {
            handle.abort();
            let _ = handle.await;
        } else {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    abort_children(&mut children);
                    return Err(e.into());
                }
                Err(e) => {
                    abort_children(&mut children);
                    return Err(e.into());
                }
            }
        }
    }

    // All terminal markers are in (or the merge gave up); wait for the peer
    // processes themselves to exit before reporting.
    if merged.is_err() {
        abort_children(&mut children);
    }
    for process in &mut children {
        match process.child.wait().await {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(peer = %process.id, %status, "Peer exited with failure status"),
            Err(e) => warn!(peer = %process.id, error = %e, "Failed to await peer exit"),
        }
    }

    merged
}

fn abort_children(children: &mut [crate::cluster::launch::PeerProcess]) {
    for process in children {
        let _ = process.child.start_kill();
    }
}
