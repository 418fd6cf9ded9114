//! Synthetic row generation for the fast-update workload.
//!
//! Customer codes, sub-customer ids, IPs, byte counts and hit counts are
//! drawn from a Pareto approximation so a small hot set dominates, the way
//! real per-customer traffic does. Regions and billing flags are uniform.

pub mod skew;

use crate::config::SizingConfig;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use skew::{Genericize, ParetoIndex};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("data file {0} contains no records")]
    Empty(String),
}

/// One logical business event. Immutable once generated; a run always works
/// over an ordered sequence of these, loaded once from the data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub customer_code: u32,
    pub timestamp_ms: i64,
    pub subcustomer_id: String,
    pub geographic_region: u32,
    pub billing_flag: u32,
    pub ip_address: String,
    pub bytes: u64,
    pub hits: u64,
}

const MAX_CUSTOMER_CODE: u32 = 100_000;
const NUM_GEOGRAPHIC_REGIONS: u32 = 10;
const NUM_BILLING_FLAGS: u32 = 5;
const NUM_IP_ADDRS: usize = 10_000;
const SUBCUSTOMER_ID_LEN: usize = 12;

/// Generates `count` records. Deterministic for a given seed.
pub fn generate_records(count: u64, seed: u64) -> Vec<Record> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let pareto = ParetoIndex::default();

    let letters = shuffled_alphabet(&mut rng);
    let customer_mapping = Genericize::new(&mut rng, MAX_CUSTOMER_CODE);
    let ip_pool = generate_ip_pool(&mut rng, NUM_IP_ADDRS);

    // Step over the byte/hit ranges the way billing counters move in
    // production traffic.
    let byte_options: Vec<u64> = (8_192..5_000_000).step_by(1_024).collect();
    let hit_options: Vec<u64> = (50..1_000).step_by(4).collect();

    let timestamp_ms = chrono::Utc::now().timestamp_millis();

    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let customer_idx = pareto.sample(&mut rng, MAX_CUSTOMER_CODE as usize);
        rows.push(Record {
            customer_code: customer_mapping.apply(customer_idx),
            timestamp_ms,
            subcustomer_id: gen_subcustomer_id(&mut rng, &pareto, &letters),
            geographic_region: rng.gen_range(1..=NUM_GEOGRAPHIC_REGIONS),
            billing_flag: rng.gen_range(1..=NUM_BILLING_FLAGS),
            ip_address: ip_pool[pareto.sample(&mut rng, ip_pool.len())].clone(),
            bytes: byte_options[pareto.sample(&mut rng, byte_options.len())],
            hits: hit_options[pareto.sample(&mut rng, hit_options.len())],
        });
    }
    rows
}

fn shuffled_alphabet(rng: &mut impl Rng) -> Vec<char> {
    use rand::seq::SliceRandom;
    let mut letters: Vec<char> = ('A'..='Z').collect();
    letters.shuffle(rng);
    letters
}

/// Draws a skewed integer below 26^12 and renders it in base 26 over a
/// shuffled alphabet, padded to a fixed width.
fn gen_subcustomer_id(rng: &mut impl Rng, pareto: &ParetoIndex, letters: &[char]) -> String {
    let total_possible = 26u64.pow(SUBCUSTOMER_ID_LEN as u32);
    let mut rnd = pareto.sample(rng, total_possible as usize) as u64;
    let mut result = String::with_capacity(SUBCUSTOMER_ID_LEN);
    while rnd > 0 {
        result.push(letters[(rnd % 26) as usize]);
        rnd /= 26;
    }
    while result.len() < SUBCUSTOMER_ID_LEN {
        result.push(letters[0]);
    }
    result
}

fn generate_ip_pool(rng: &mut impl Rng, count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            format!(
                "{}.{}.{}.{}",
                rng.gen_range(1..=223u8),
                rng.gen_range(0..=255u8),
                rng.gen_range(0..=255u8),
                rng.gen_range(1..=254u8)
            )
        })
        .collect()
}

/// Converts a cluster memory budget (GiB) into a per-machine row count.
/// The per-row cost constant is a rough estimate; see `SizingConfig`.
pub fn rows_for_memory(cluster_memory_gib: f64, machines: usize, sizing: &SizingConfig) -> u64 {
    let mem_bytes = cluster_memory_gib * (1u64 << 30) as f64;
    let rows = mem_bytes / sizing.per_row_cost_bytes as f64 * sizing.fill_factor;
    (rows as u64) / machines.max(1) as u64
}

/// Writes records to the data file, one JSON object per line.
pub fn write_data_file(path: &Path, records: &[Record]) -> Result<(), GenError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        let line = serde_json::to_string(record).map_err(GenError::Encode)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = records.len(), "Wrote data file");
    Ok(())
}

/// Loads the full record sequence from the data file, in file order.
pub fn load_data_file(path: &Path) -> Result<Vec<Record>, GenError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record =
            serde_json::from_str(&line).map_err(|source| GenError::Parse { line: i + 1, source })?;
        records.push(record);
    }
    if records.is_empty() {
        return Err(GenError::Empty(path.display().to_string()));
    }
    Ok(records)
}
