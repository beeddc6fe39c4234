use super::AnomalyArgs;
use crate::config::StoreArgs;
use crate::engine::FillArgs;
use crate::metrics::parse_duration_string;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
pub struct FillCommand {
    /// Recorded metric CSV files, one per host
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Offset into each recording to start from (e.g. 2h)
    #[arg(short = 's', long = "start-at", value_parser = parse_duration_string, value_name = "DURATION")]
    pub start_at: Option<Duration>,

    /// Length of recording to replay; the rest of the file when omitted
    #[arg(short = 'd', long = "duration", value_parser = parse_duration_string, value_name = "DURATION")]
    pub duration: Option<Duration>,

    /// Time left between the last inserted sample and now
    #[arg(short = 'g', long = "gap", value_parser = parse_duration_string, value_name = "DURATION")]
    pub gap: Option<Duration>,

    #[command(flatten)]
    pub anomaly: AnomalyArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl FillCommand {
    pub fn to_args(&self) -> FillArgs {
        FillArgs {
            files: self.files.clone(),
            start_at: self.start_at.unwrap_or_default(),
            duration: self.duration.unwrap_or_default(),
            gap: self.gap.unwrap_or_default(),
            anomaly: self.anomaly.anomaly.clone(),
            anomaly_window: self.anomaly.window(),
        }
    }
}
