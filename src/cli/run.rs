use crate::cluster::launch::{copy_data_file, LaunchError, PeerCommand};
use crate::cluster::protocol::{group_digits, PeerStatus, ProtocolError};
use crate::cluster::supervisor::{run_cluster, ClusterError, ClusterOptions, ClusterReport};
use crate::config::{expand_tilde, load_peers_file, parse_peer, Config, ConfigError, PeerConfig};
use crate::engine::coordinator::{run_node, NodeError, NodeOptions};
use crate::gen::{self, GenError, Record};
use crate::query::{build_batches, schema, QueryBatch, QueryError};
use crate::target::{Connection, MySqlTarget, Target, TargetError};
use clap::Args;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data generation error: {0}")]
    Gen(#[from] GenError),

    #[error("batch builder error: {0}")]
    Query(#[from] QueryError),

    #[error("target error: {0}")]
    Target(#[from] TargetError),

    #[error("node coordinator error: {0}")]
    Node(#[from] NodeError),

    #[error("cluster supervisor error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("peer launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("status protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Workload options shared by the master `run` and the spawned `peer` roles.
/// A master forwards these to its peers so every node runs the same pass.
#[derive(Args, Debug, Clone)]
pub struct WorkloadArgs {
    /// Benchmark database to create and load.
    #[arg(long, default_value = "perfdb")]
    pub database: String,

    #[arg(long, default_value = "records")]
    pub table: String,

    /// Database host this node connects to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = 3306)]
    pub port: u16,

    #[arg(long, default_value = "root")]
    pub user: String,

    /// Taken from the environment so it never appears in remote command lines.
    #[arg(long, env = "STAMPEDE_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Pre-generated data file; generated on demand when missing.
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// How long to drive load.
    #[arg(long, default_value = "10s")]
    pub duration: humantime::Duration,

    /// Rows per upsert batch (one network round-trip).
    #[arg(long, default_value_t = 500)]
    pub batch_size: usize,

    /// Concurrent workers; defaults to available hardware parallelism.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Total cluster memory in GiB; sizes the generated row count.
    #[arg(long, default_value_t = 1.0)]
    pub cluster_memory: f64,

    /// Data generator seed; 0 picks a random seed.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Skip schema setup, warmup and data distribution.
    #[arg(long)]
    pub no_setup: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub workload: WorkloadArgs,

    /// Remote peer to fan out to, `host[:port]`; repeatable. Merged with the
    /// peers from the config file.
    #[arg(short = 'a', long = "peer")]
    pub peers: Vec<String>,

    /// File listing one peer per line.
    #[arg(long)]
    pub peers_file: Option<PathBuf>,

    /// Drop the benchmark database when the run ends, even after an
    /// interrupt.
    #[arg(long)]
    pub drop_database: bool,
}

/// Master entry point: runs the benchmark locally and, when peers are
/// configured, fans out to them and merges their reports.
pub async fn run(args: RunArgs, config: Config) -> Result<(), RunError> {
    let workload = args.workload.clone();
    let mut peers = config.peers.clone();
    for spec in &args.peers {
        peers.push(parse_peer(spec)?);
    }
    if let Some(path) = &args.peers_file {
        peers.extend(load_peers_file(&expand_tilde(path))?);
    }

    let benchmark = benchmark_run(&workload, peers, &config);
    let outcome = tokio::select! {
        result = benchmark => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            None
        }
    };

    // Teardown runs on every path out of the run, interrupts included.
    if args.drop_database {
        if let Err(e) = cleanup(&workload).await {
            error!(error = %e, "Cleanup failed");
        }
    }

    match outcome {
        Some(Ok(report)) => {
            report.print();
            Ok(())
        }
        Some(Err(e)) => Err(e),
        // Interruption is recovered locally, not surfaced as a crash.
        None => Ok(()),
    }
}

async fn benchmark_run(
    workload: &WorkloadArgs,
    peers: Vec<PeerConfig>,
    config: &Config,
) -> Result<ClusterReport, RunError> {
    let data_file = resolve_data_file(workload);
    let machines = peers.len() + 1;
    let duration: Duration = workload.duration.into();

    if !workload.no_setup {
        setup_schema(workload).await?;
        warmup(workload).await?;
    }

    let seed = resolve_seed(workload.seed);
    let rows = gen::rows_for_memory(workload.cluster_memory, machines, &config.sizing);
    let records = ensure_data_file(&data_file, rows, seed)?;
    let batches = build_batches(&workload.table, &records, workload.batch_size)?;

    let target = benchmark_target(workload);
    let node_opts = NodeOptions {
        workers: resolve_workers(workload.workers),
        duration,
        report_every: config.report.every_records,
    };

    if peers.is_empty() {
        return run_local(target, batches, node_opts, duration).await;
    }

    if !workload.no_setup {
        for peer in &peers {
            copy_data_file(&config.ssh, peer, &data_file).await?;
        }
    }

    let peer_command = PeerCommand {
        database: workload.database.clone(),
        table: workload.table.clone(),
        port: workload.port,
        user: workload.user.clone(),
        data_file,
        duration,
        batch_size: workload.batch_size,
        workers: workload.workers,
        cluster_memory_gib: workload.cluster_memory,
        seed,
        no_setup: workload.no_setup,
    };
    let opts = ClusterOptions {
        node: node_opts,
        flush_interval: config.report.cluster_flush_interval,
        grace: config.report.peer_grace,
    };

    info!(peers = peers.len() + 1, "Starting cluster benchmark");
    let report = run_cluster(target, batches, &peers, &config.ssh, &peer_command, &opts).await?;
    Ok(report)
}

/// Single-node pass: live samples go straight to the console instead of
/// through the peer protocol.
async fn run_local(
    target: Arc<dyn Target>,
    batches: Vec<QueryBatch>,
    node_opts: NodeOptions,
    duration: Duration,
) -> Result<ClusterReport, RunError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(status) = rx.recv().await {
            if let PeerStatus::LiveRate { rows_per_sec } = status {
                println!(
                    "Current upsert throughput: {} rows / s",
                    group_digits(rows_per_sec)
                );
            }
        }
    });

    let report = run_node(target.as_ref(), batches, &node_opts, tx).await?;
    let _ = printer.await;
    Ok(ClusterReport::from_node(&report, duration))
}

/// Spawned-peer entry point: same benchmark pass, but stdout carries the
/// status protocol and nothing else.
pub async fn peer(workload: WorkloadArgs, config: Config) -> Result<(), RunError> {
    let data_file = resolve_data_file(&workload);
    let duration: Duration = workload.duration.into();

    if !workload.no_setup {
        warmup(&workload).await?;
    }

    let seed = resolve_seed(workload.seed);
    let rows = gen::rows_for_memory(workload.cluster_memory, 1, &config.sizing);
    let records = ensure_data_file(&data_file, rows, seed)?;
    let batches = build_batches(&workload.table, &records, workload.batch_size)?;

    let target = benchmark_target(&workload);
    let node_opts = NodeOptions {
        workers: resolve_workers(workload.workers),
        duration,
        report_every: config.report.every_records,
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<PeerStatus>();
    let emitter = tokio::spawn(async move {
        use std::io::Write as _;
        let mut out = std::io::stdout();
        while let Some(status) = rx.recv().await {
            match status.encode() {
                // Flushed per line: the parent parses as lines arrive.
                Ok(line) => {
                    let _ = writeln!(out, "{}", line);
                    let _ = out.flush();
                }
                Err(e) => error!(error = %e, "Failed to encode status"),
            }
        }
    });

    let report = run_node(target.as_ref(), batches, &node_opts, tx).await?;
    let _ = emitter.await;
    info!(rows = report.rows, "Peer run complete");
    Ok(())
}

fn benchmark_target(workload: &WorkloadArgs) -> Arc<dyn Target> {
    Arc::new(MySqlTarget::new(
        &workload.host,
        workload.port,
        &workload.user,
        workload.password.as_deref(),
        Some(&workload.database),
    ))
}

fn admin_target(workload: &WorkloadArgs) -> MySqlTarget {
    MySqlTarget::new(
        &workload.host,
        workload.port,
        &workload.user,
        workload.password.as_deref(),
        None,
    )
}

async fn setup_schema(workload: &WorkloadArgs) -> Result<(), RunError> {
    info!(database = %workload.database, table = %workload.table, "Setting up schema");
    let mut conn = admin_target(workload).connect().await?;
    conn.execute(&schema::create_database(&workload.database))
        .await?;
    conn.execute(&schema::create_table(&workload.database, &workload.table))
        .await?;
    Ok(())
}

/// One throwaway round-trip per statement so the first measured batch does
/// not pay connection warmup costs.
async fn warmup(workload: &WorkloadArgs) -> Result<(), RunError> {
    let mut conn = admin_target(workload).connect().await?;
    for statement in schema::warmup(&workload.database) {
        conn.execute(&statement).await?;
    }
    Ok(())
}

async fn cleanup(workload: &WorkloadArgs) -> Result<(), RunError> {
    let mut conn = admin_target(workload).connect().await?;
    conn.execute(&schema::drop_database(&workload.database))
        .await?;
    info!(database = %workload.database, "Dropped benchmark database");
    Ok(())
}

fn resolve_data_file(workload: &WorkloadArgs) -> PathBuf {
    match &workload.data_file {
        Some(path) => expand_tilde(path),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stampede/data.ndjson"),
    }
}

pub(crate) fn resolve_seed(seed: u64) -> u64 {
    if seed == 0 {
        rand::thread_rng().gen()
    } else {
        seed
    }
}

fn resolve_workers(requested: Option<usize>) -> usize {
    requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Reuses an existing data file so repeated runs hammer the same key space;
/// generates and persists one otherwise.
fn ensure_data_file(path: &PathBuf, rows: u64, seed: u64) -> Result<Vec<Record>, GenError> {
    if path.is_file() {
        info!(path = %path.display(), "Using existing data file");
        return gen::load_data_file(path);
    }
    info!(rows, "Generating test data");
    let records = gen::generate_records(rows.max(1), seed);
    gen::write_data_file(path, &records)?;
    Ok(records)
}
