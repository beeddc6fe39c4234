//! fleetsim binary.
//!
//! Replays recorded host metrics into a time-series store to simulate a fleet
//! of monitored machines for anomaly-detection testing.

use clap::Parser;
use fleetsim_core::{
    cli::commands::Commands,
    cli::handlers::{handle_clean, handle_detect, handle_fill, handle_stream, init_logging},
    config::Settings,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (overrides the configured level)
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref(), cli.command.store_args())?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    let _guard = init_logging(&settings.logging)?;

    info!(engine = %settings.store.engine, "fleetsim starting");

    match cli.command {
        Commands::Fill(cmd) => handle_fill(settings, cmd).await,
        Commands::Stream(cmd) => handle_stream(settings, cmd).await,
        Commands::Clean(cmd) => handle_clean(settings, cmd).await,
        Commands::Detect(cmd) => handle_detect(settings, cmd).await,
    }
}
