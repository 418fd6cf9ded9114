use clap::{Parser, Subcommand};
use stampede::cli::datagen::DatagenArgs;
use stampede::cli::run::{RunArgs, WorkloadArgs};
use stampede::config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stampede")]
#[command(about = "Distributed upsert benchmark", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark from this node, fanning out to configured peers.
    Run(RunArgs),
    /// Run as a spawned peer: the status protocol owns stdout.
    Peer(WorkloadArgs),
    /// Generate the benchmark data file.
    Datagen(DatagenArgs),
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics always go to stderr: in peer mode stdout belongs to the
    // status protocol.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stampede=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match stampede::config::resolve_config_path(cli.config.as_deref()) {
        Some(path) => stampede::config::load_config(&path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Run(args) => stampede::cli::run::run(args, config).await?,
        Commands::Peer(args) => stampede::cli::run::peer(args, config).await?,
        Commands::Datagen(args) => stampede::cli::datagen::datagen(args, config)?,
        Commands::Config { action } => match action {
            ConfigAction::Init { stdout } => stampede::cli::config::init(stdout)?,
        },
    }

    Ok(())
}
