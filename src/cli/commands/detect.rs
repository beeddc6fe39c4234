use crate::config::StoreArgs;
use crate::metrics::parse_duration_string;
use clap::Args;
use std::time::Duration;

#[derive(Args)]
pub struct DetectCommand {
    /// Host to analyse
    #[arg(value_name = "HOST")]
    pub host: String,

    /// Detection algorithm
    #[arg(long = "algorithm", default_value = "IF")]
    pub algorithm: String,

    /// Trailing window of stored metrics to analyse
    #[arg(short = 'd', long = "duration", value_parser = parse_duration_string, value_name = "DURATION")]
    pub duration: Duration,

    #[command(flatten)]
    pub store: StoreArgs,
}
