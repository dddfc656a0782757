//! Command-line interface for groonga-delta
//!
//! # Usage Examples
//!
//! ```bash
//! # Import changes from the configured sources into the delta log once
//! groonga-delta import --dir /etc/groonga-delta
//!
//! # Keep importing every polling_interval seconds
//! groonga-delta import --dir /etc/groonga-delta --server
//!
//! # Replay the delta log into Groonga
//! groonga-delta apply --dir /etc/groonga-delta --server
//! ```
//!
//! `--dir` holds `config.yaml`, the optional `secret.yaml` and the
//! `status.yaml` checkpoint document.

use checkpoint::CheckpointManager;
use clap::{Args, Parser, Subcommand};
use groonga_client::HttpClient;
use groonga_delta::{logging, run, setup_shutdown_handler, Applier, ApplyConfig, ImportConfig, Importer};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "groonga-delta")]
#[command(version)]
#[command(about = "Replicate MySQL and Groonga command log changes into Groonga through a delta log")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import changes from the configured sources into the delta log
    Import(RunArgs),

    /// Apply the delta log to Groonga
    Apply(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Directory that has configuration files
    #[arg(long, default_value = ".", env = "GROONGA_DELTA_DIR")]
    dir: PathBuf,

    /// Run as a server: repeat every polling_interval seconds
    #[arg(long)]
    server: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run_command().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Import(args) => {
            let config = ImportConfig::load(&args.dir)?;
            logging::init("import", &config.common)?;
            tracing::info!("Starting import: {}", args.dir.display());

            let checkpoints = CheckpointManager::filesystem(&args.dir);
            let mut importer = Importer::new(&config, checkpoints);
            run(
                &mut importer,
                args.server,
                config.common.polling_interval,
                setup_shutdown_handler(),
            )
            .await
        }
        Commands::Apply(args) => {
            let config = ApplyConfig::load(&args.dir)?;
            logging::init("apply", &config.common)?;
            tracing::info!(
                "Starting apply: {} to {}",
                config.delta_dir.display(),
                config.groonga.url
            );

            let client = HttpClient::new(&config.groonga.url, config.groonga.read_timeout)?;
            let checkpoints = CheckpointManager::filesystem(&args.dir);
            let mut applier = Applier::new(
                &config.delta_dir,
                Arc::new(client),
                config.on_error,
                checkpoints,
            );
            run(
                &mut applier,
                args.server,
                config.common.polling_interval,
                setup_shutdown_handler(),
            )
            .await
        }
    }
}
