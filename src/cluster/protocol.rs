//! Status messages between a spawned peer and its parent.
//!
//! One JSON object per line on the peer's stdout. Stdout belongs to this
//! protocol exclusively; all diagnostics go to stderr. A peer emits
//! `LiveRate` samples while running, then `FinalTotal`, `FinalLatency` and
//! `Done` when it finishes. `Done` is the terminal marker: once received,
//! the peer has reported everything it ever will.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode status: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("unparseable status line {line:?}: {source}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Latencies travel as integer microseconds; display formatting converts to
/// milliseconds in one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerStatus {
    /// Instantaneous throughput since the previous sample, not a cumulative
    /// average.
    LiveRate { rows_per_sec: u64 },
    FinalTotal { host: String, rows: u64 },
    FinalLatency { min_us: u64, max_us: u64 },
    Done,
}

impl PeerStatus {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn parse_line(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line.trim()).map_err(|source| ProtocolError::Parse {
            line: line.to_string(),
            source,
        })
    }
}

/// Renders a count with comma grouping for the human-facing report lines.
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_latency_ms(latency: Duration) -> String {
    format!("{:.3} ms", latency.as_secs_f64() * 1_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines_round_trip() {
        let statuses = [
            PeerStatus::LiveRate { rows_per_sec: 125_000 },
            PeerStatus::FinalTotal {
                host: "agg-2".to_string(),
                rows: 4_500_000,
            },
            PeerStatus::FinalLatency {
                min_us: 850,
                max_us: 12_400,
            },
            PeerStatus::Done,
        ];
        for status in statuses {
            let line = status.encode().unwrap();
            assert!(!line.contains('\n'));
            assert_eq!(PeerStatus::parse_line(&line).unwrap(), status);
        }
    }

    #[test]
    fn test_tagged_encoding_is_stable() {
        let line = PeerStatus::LiveRate { rows_per_sec: 10 }.encode().unwrap();
        assert_eq!(line, r#"{"type":"live_rate","rows_per_sec":10}"#);
    }

    #[test]
    fn test_garbage_lines_are_rejected() {
        assert!(PeerStatus::parse_line("Warning: Permanently added host").is_err());
        assert!(PeerStatus::parse_line(r#"{"type":"unknown_variant"}"#).is_err());
        assert!(PeerStatus::parse_line("").is_err());
    }

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1_000), "1,000");
        assert_eq!(group_digits(4_500_000), "4,500,000");
    }

    #[test]
    fn test_format_latency_ms() {
        assert_eq!(
            format_latency_ms(Duration::from_micros(1_500)),
            "1.500 ms"
        );
    }
}
