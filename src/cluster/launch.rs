//! Thin wrappers around ssh/scp for starting remote peers.
//!
//! The engine never sees these; it consumes the spawned child's stdout as a
//! status stream and a handle to await its exit.

use crate::config::{PeerConfig, SshConfig};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {command} for peer {peer}: {source}")]
    Spawn {
        peer: String,
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("peer {peer}: no stdout handle from spawned process")]
    NoStdout { peer: String },

    #[error("copy to peer {peer} exited with {status}")]
    CopyFailed {
        peer: String,
        status: std::process::ExitStatus,
    },

    #[error("io error while copying to peer {peer}: {source}")]
    CopyIo {
        peer: String,
        #[source]
        source: std::io::Error,
    },
}

/// Workload knobs forwarded verbatim to a spawned peer so it runs the exact
/// same benchmark pass.
#[derive(Debug, Clone)]
pub struct PeerCommand {
    pub database: String,
    pub table: String,
    pub port: u16,
    pub user: String,
    pub data_file: PathBuf,
    pub duration: Duration,
    pub batch_size: usize,
    pub workers: Option<usize>,
    pub cluster_memory_gib: f64,
    pub seed: u64,
    pub no_setup: bool,
}

impl PeerCommand {
    fn to_args(&self, peer: &PeerConfig) -> Vec<String> {
        let mut args = vec![
            "peer".to_string(),
            "--database".to_string(),
            self.database.clone(),
            "--table".to_string(),
            self.table.clone(),
            "--port".to_string(),
            peer.port.unwrap_or(self.port).to_string(),
            "--user".to_string(),
            self.user.clone(),
            "--data-file".to_string(),
            self.data_file.display().to_string(),
            "--duration".to_string(),
            humantime::format_duration(self.duration).to_string(),
            "--batch-size".to_string(),
            self.batch_size.to_string(),
            "--cluster-memory".to_string(),
            self.cluster_memory_gib.to_string(),
            "--seed".to_string(),
            self.seed.to_string(),
        ];
        if let Some(workers) = self.workers {
            args.push("--workers".to_string());
            args.push(workers.to_string());
        }
        if self.no_setup {
            args.push("--no-setup".to_string());
        }
        args
    }
}

/// A remote peer process with its status stream detached for reading.
pub struct PeerProcess {
    pub id: String,
    pub child: Child,
}

fn ssh_destination(ssh: &SshConfig, host: &str) -> String {
    match &ssh.username {
        Some(user) => format!("{}@{}", user, host),
        None => host.to_string(),
    }
}

fn ssh_base_args(ssh: &SshConfig) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(key) = &ssh.key_path {
        args.push("-i".to_string());
        args.push(key.display().to_string());
    }
    args.push("-o".to_string());
    args.push("StrictHostKeyChecking=no".to_string());
    args
}

/// Starts the stampede binary on a peer via ssh, stdout piped for the
/// status protocol. Diagnostics from the remote side arrive on stderr and
/// pass through to the operator's console.
pub fn launch_peer(
    ssh: &SshConfig,
    peer: &PeerConfig,
    command: &PeerCommand,
) -> Result<(PeerProcess, ChildStdout), LaunchError> {
    let mut cmd = Command::new("ssh");
    cmd.args(ssh_base_args(ssh));
    cmd.arg(ssh_destination(ssh, &peer.host));
    cmd.arg(&ssh.remote_binary);
    cmd.args(command.to_args(peer));
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        // An interrupted master tears its peers down with it.
        .kill_on_drop(true);

    info!(peer = %peer.host, "Launching remote peer");
    debug!(peer = %peer.host, command = ?cmd.as_std(), "Peer command line");

    let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        peer: peer.host.clone(),
        command: "ssh",
        source,
    })?;
    let stdout = child.stdout.take().ok_or_else(|| LaunchError::NoStdout {
        peer: peer.host.clone(),
    })?;

    Ok((
        PeerProcess {
            id: peer.host.clone(),
            child,
        },
        stdout,
    ))
}

/// Copies the data file to a peer with scp, creating the remote directory
/// first so a fresh machine works out of the box.
pub async fn copy_data_file(
    ssh: &SshConfig,
    peer: &PeerConfig,
    data_file: &Path,
) -> Result<(), LaunchError> {
    let destination = ssh_destination(ssh, &peer.host);

    if let Some(parent) = data_file.parent() {
        if !parent.as_os_str().is_empty() {
            let status = Command::new("ssh")
                .args(ssh_base_args(ssh))
                .arg(&destination)
                .arg("mkdir")
                .arg("-p")
                .arg(parent.display().to_string())
                .stdin(Stdio::null())
                .status()
                .await
                .map_err(|source| LaunchError::CopyIo {
                    peer: peer.host.clone(),
                    source,
                })?;
            if !status.success() {
                return Err(LaunchError::CopyFailed {
                    peer: peer.host.clone(),
                    status,
                });
            }
        }
    }

    info!(peer = %peer.host, file = %data_file.display(), "Copying data file");
    let status = Command::new("scp")
        .args(ssh_base_args(ssh))
        .arg(data_file.display().to_string())
        .arg(format!("{}:{}", destination, data_file.display()))
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|source| LaunchError::CopyIo {
            peer: peer.host.clone(),
            source,
        })?;
    if !status.success() {
        return Err(LaunchError::CopyFailed {
            peer: peer.host.clone(),
            status,
        });
    }
    Ok(())
}
