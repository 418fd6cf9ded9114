use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Cluster-level configuration loaded from YAML.
///
/// This file describes how to reach and drive the fleet; per-run workload
/// knobs (duration, batch size, worker count) live on the command line and
/// are forwarded to spawned peers verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ssh: SshConfig,

    /// Peers to fan out to, merged with any `--peer` flags.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    #[serde(default)]
    pub sizing: SizingConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Login user on the peers. Defaults to the invoking user.
    pub username: Option<String>,

    /// Identity file passed to ssh/scp with -i.
    pub key_path: Option<PathBuf>,

    /// Path of the stampede binary on the peers.
    #[serde(default = "default_remote_binary")]
    pub remote_binary: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: None,
            key_path: None,
            remote_binary: default_remote_binary(),
        }
    }
}

fn default_remote_binary() -> String {
    "stampede".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub host: String,

    /// Database port on that peer. Defaults to the master's --port.
    pub port: Option<u16>,
}

/// Converts a cluster memory budget into a per-machine row count.
///
/// The per-row cost is a rough estimate with no exact derivation; it is kept
/// as an explicit knob so operators can calibrate it against their store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_per_row_cost")]
    pub per_row_cost_bytes: u64,

    /// Fraction of the memory budget to actually fill with rows.
    #[serde(default = "default_fill_factor")]
    pub fill_factor: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            per_row_cost_bytes: default_per_row_cost(),
            fill_factor: default_fill_factor(),
        }
    }
}

fn default_per_row_cost() -> u64 {
    200
}

fn default_fill_factor() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Emit a live throughput sample every N recorded operations.
    #[serde(default = "default_report_every")]
    pub every_records: u64,

    /// Wall-clock cadence for flushing the merged cluster rate.
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub cluster_flush_interval: Duration,

    /// Extra time peers get to report their finals after the run duration.
    #[serde(with = "humantime_serde", default = "default_peer_grace")]
    pub peer_grace: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            every_records: default_report_every(),
            cluster_flush_interval: default_flush_interval(),
            peer_grace: default_peer_grace(),
        }
    }
}

fn default_report_every() -> u64 {
    100
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_peer_grace() -> Duration {
    Duration::from_secs(60)
}
