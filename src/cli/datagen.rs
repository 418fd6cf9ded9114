use crate::cli::run::{resolve_seed, RunError};
use crate::config::{expand_tilde, Config};
use crate::gen;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct DatagenArgs {
    /// Explicit row count; overrides the memory-based sizing.
    #[arg(long)]
    pub rows: Option<u64>,

    /// Total cluster memory in GiB; sizes the row count when --rows is not
    /// given.
    #[arg(long, default_value_t = 1.0)]
    pub cluster_memory: f64,

    /// Machines the workload will be spread across.
    #[arg(long, default_value_t = 1)]
    pub machines: usize,

    /// Where to write the data file.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Generator seed; 0 picks a random seed.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

pub fn datagen(args: DatagenArgs, config: Config) -> Result<(), RunError> {
    let rows = args
        .rows
        .unwrap_or_else(|| gen::rows_for_memory(args.cluster_memory, args.machines, &config.sizing))
        .max(1);

    let out = match &args.out {
        Some(path) => expand_tilde(path),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stampede/data.ndjson"),
    };

    let seed = resolve_seed(args.seed);
    info!(rows, seed, "Generating test data");
    let records = gen::generate_records(rows, seed);
    gen::write_data_file(&out, &records)?;
    println!("{} rows written to {}", records.len(), out.display());
    Ok(())
}
