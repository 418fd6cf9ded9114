use super::types::{Config, PeerConfig};
use crate::config::expand_tilde;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        ))
    })?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(config: &mut Config) {
    if let Some(key_path) = &config.ssh.key_path {
        config.ssh.key_path = Some(expand_tilde(key_path));
    }
}

/// Parses a `host[:port]` peer specifier as given on the command line
/// or in a peers file. The port, when present, is the database port on
/// that peer, not an ssh port.
pub fn parse_peer(spec: &str) -> Result<PeerConfig, ConfigError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ConfigError::Validation("empty peer specifier".to_string()));
    }

    match spec.split_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| {
                ConfigError::Validation(format!("invalid port in peer specifier '{}'", spec))
            })?;
            Ok(PeerConfig {
                host: host.to_string(),
                port: Some(port),
            })
        }
        None => Ok(PeerConfig {
            host: spec.to_string(),
            port: None,
        }),
    }
}

/// Reads a peers file: one `host[:port]` per line, blank lines and
/// `#` comments skipped.
pub fn load_peers_file(path: &Path) -> Result<Vec<PeerConfig>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read peers file '{}': {}", path.display(), e),
        ))
    })?;

    let mut peers = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        peers.push(parse_peer(line)?);
    }
    Ok(peers)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    let mut hosts = HashSet::new();
    for (i, peer) in config.peers.iter().enumerate() {
        if peer.host.is_empty() {
            errors.push(format!("peers[{}]: host cannot be empty", i));
        } else if !hosts.insert(&peer.host) {
            errors.push(format!("peers[{}]: duplicate peer host '{}'", i, peer.host));
        }
    }

    if config.sizing.per_row_cost_bytes == 0 {
        errors.push("sizing.per_row_cost_bytes must be greater than zero".to_string());
    }
    if !(config.sizing.fill_factor > 0.0 && config.sizing.fill_factor <= 1.0) {
        errors.push("sizing.fill_factor must be in (0, 1]".to_string());
    }

    if config.report.every_records == 0 {
        errors.push("report.every_records must be greater than zero".to_string());
    }
    if config.report.cluster_flush_interval.is_zero() {
        errors.push("report.cluster_flush_interval must be greater than zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
