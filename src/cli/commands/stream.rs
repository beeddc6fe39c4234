use super::AnomalyArgs;
use crate::config::StoreArgs;
use crate::engine::StreamArgs;
use crate::metrics::parse_duration_string;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
pub struct StreamCommand {
    /// Recorded metric CSV file of one host
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Offset into the recording to start from (e.g. 2h)
    #[arg(short = 's', long = "start-at", value_parser = parse_duration_string, value_name = "DURATION")]
    pub start_at: Option<Duration>,

    /// Length of recording to replay; the rest of the file when omitted
    #[arg(short = 'd', long = "duration", value_parser = parse_duration_string, value_name = "DURATION")]
    pub duration: Option<Duration>,

    /// Replay speed-up; values above 1 need --append
    #[arg(
        short = 't',
        long = "time-multiplier",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub time_multiplier: u32,

    /// Continue after the host's most recent stored sample
    #[arg(long = "append")]
    pub append: bool,

    #[command(flatten)]
    pub anomaly: AnomalyArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl StreamCommand {
    pub fn to_args(&self) -> StreamArgs {
        StreamArgs {
            file: self.file.clone(),
            start_at: self.start_at.unwrap_or_default(),
            duration: self.duration.unwrap_or_default(),
            time_multiplier: self.time_multiplier,
            append: self.append,
            anomaly: self.anomaly.anomaly.clone(),
            anomaly_window: self.anomaly.window(),
        }
    }
}
