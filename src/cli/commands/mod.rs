pub mod clean;
pub mod detect;
pub mod fill;
pub mod stream;

pub use clean::CleanCommand;
pub use detect::DetectCommand;
pub use fill::FillCommand;
pub use stream::StreamCommand;

use crate::anomaly::AnomalyWindow;
use crate::config::StoreArgs;
use crate::metrics::parse_duration_string;
use clap::{Args, Subcommand};
use std::time::Duration;

#[derive(Subcommand)]
pub enum Commands {
    /// Load whole recorded series for many hosts at once
    Fill(FillCommand),
    /// Replay one host's series in real time
    Stream(StreamCommand),
    /// Delete replayed data for some or all hosts
    Clean(CleanCommand),
    /// Run an anomaly detection algorithm over a host's stored metrics
    Detect(DetectCommand),
}

impl Commands {
    pub fn store_args(&self) -> &StoreArgs {
        match self {
            Commands::Fill(cmd) => &cmd.store,
            Commands::Stream(cmd) => &cmd.store,
            Commands::Clean(cmd) => &cmd.store,
            Commands::Detect(cmd) => &cmd.store,
        }
    }
}

/// Anomaly selection shared by fill and stream.
#[derive(Debug, Clone, Default, Args)]
pub struct AnomalyArgs {
    /// Anomaly to inject (a1, a2)
    #[arg(short = 'a', long = "anomaly", default_value = "", hide_default_value = true)]
    pub anomaly: String,

    /// Offset into the replayed series where the anomaly starts
    #[arg(long = "anomaly-start", value_parser = parse_duration_string, value_name = "DURATION")]
    pub start: Option<Duration>,

    /// How long the anomaly lasts; runs to the end when omitted
    #[arg(long = "anomaly-duration", value_parser = parse_duration_string, value_name = "DURATION")]
    pub duration: Option<Duration>,
}

impl AnomalyArgs {
    /// Window limiting the anomaly, when either bound was given.
    pub fn window(&self) -> Option<AnomalyWindow> {
        if self.start.is_none() && self.duration.is_none() {
            return None;
        }
        Some(AnomalyWindow {
            start_at: self.start.unwrap_or_default(),
            duration: self.duration.unwrap_or_default(),
        })
    }
}
