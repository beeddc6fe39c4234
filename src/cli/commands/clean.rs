use crate::config::StoreArgs;
use crate::engine::CleanArgs;
use crate::metrics::parse_duration_string;
use clap::Args;
use std::time::Duration;

#[derive(Args)]
pub struct CleanCommand {
    /// Hosts whose data is deleted
    #[arg(value_name = "HOST", required_unless_present = "all")]
    pub hosts: Vec<String>,

    /// Delete every host in the measurement
    #[arg(long = "all")]
    pub all: bool,

    /// Trailing window to delete; everything up to now when omitted
    #[arg(short = 'd', long = "duration", value_parser = parse_duration_string, value_name = "DURATION")]
    pub duration: Option<Duration>,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl CleanCommand {
    pub fn to_args(&self, measurement: &str) -> CleanArgs {
        CleanArgs {
            all: self.all,
            hosts: self.hosts.clone(),
            duration: self.duration,
            measurement: measurement.to_string(),
        }
    }
}
