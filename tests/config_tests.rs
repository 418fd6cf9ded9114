use stampede::config::{load_config, load_peers_file, Config, ConfigError};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_full_cluster_config_parsing() {
    let yaml = r#"
ssh:
  username: bench
  key_path: /home/bench/.ssh/id_rsa
  remote_binary: /usr/local/bin/stampede

peers:
  - host: 10.0.0.11
  - host: 10.0.0.12
    port: 3307

sizing:
  per_row_cost_bytes: 256
  fill_factor: 0.4

report:
  every_records: 50
  cluster_flush_interval: 500ms
  peer_grace: 2m
"#;

    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.ssh.username.as_deref(), Some("bench"));
    assert_eq!(config.ssh.remote_binary, "/usr/local/bin/stampede");
    assert_eq!(config.peers.len(), 2);
    assert_eq!(config.peers[0].host, "10.0.0.11");
    assert_eq!(config.peers[0].port, None);
    assert_eq!(config.peers[1].port, Some(3307));
    assert_eq!(config.sizing.per_row_cost_bytes, 256);
    assert_eq!(config.report.every_records, 50);
    assert_eq!(
        config.report.cluster_flush_interval,
        Duration::from_millis(500)
    );
    assert_eq!(config.report.peer_grace, Duration::from_secs(120));
}

#[test]
fn test_empty_config_gets_defaults() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert!(config.peers.is_empty());
    assert_eq!(config.ssh.remote_binary, "stampede");
    assert_eq!(config.sizing.per_row_cost_bytes, 200);
    assert_eq!(config.report.every_records, 100);
    assert_eq!(config.report.cluster_flush_interval, Duration::from_secs(1));
    assert_eq!(config.report.peer_grace, Duration::from_secs(60));
}

#[test]
fn test_load_config_collects_validation_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
peers:
  - host: dup
  - host: dup
sizing:
  per_row_cost_bytes: 0
  fill_factor: 1.5
"#
    )
    .unwrap();

    let err = load_config(file.path()).unwrap_err();
    match err {
        ConfigError::ValidationList(errors) => {
            assert!(errors.iter().any(|e| e.contains("duplicate peer host")));
            assert!(errors.iter().any(|e| e.contains("per_row_cost_bytes")));
            assert!(errors.iter().any(|e| e.contains("fill_factor")));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_load_config_round_trips_a_valid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
peers:
  - host: agg-1
report:
  every_records: 10
"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.peers.len(), 1);
    assert_eq!(config.report.every_records, 10);
}

#[test]
fn test_peers_file_skips_blanks_and_comments() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "# benchmark aggregators\nagg-1\n\nagg-2:3307\n  \n"
    )
    .unwrap();

    let peers = load_peers_file(file.path()).unwrap();
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].host, "agg-1");
    assert_eq!(peers[1].host, "agg-2");
    assert_eq!(peers[1].port, Some(3307));
}
