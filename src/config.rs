//! Configuration management for fleetsim.
//!
//! Settings are layered from these sources, later ones overriding earlier ones:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/fleetsim/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (`FLEETSIM__STORE__TOKEN`, `FLEETSIM__LOGGING__LEVEL`, ...)
//! 5. Command-line arguments
//!
//! # Environment Variables
//!
//! The store flags also read the InfluxDB variables used by the replay tooling:
//! `INFLUXDB_TOKEN`, `INFLUXDB_HOST`, `INFLUXDB_PORT`, `INFLUXDB_ORG`,
//! `INFLUXDB_BUCKET` and `INFLUXDB_MEASUREMENT`.

use crate::error::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store connection flags shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Store engine: influxdb or duckdb
    #[arg(long = "db-engine")]
    pub engine: Option<String>,

    /// InfluxDB API token
    #[arg(short = 'T', long = "db-token", env = "INFLUXDB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// InfluxDB host
    #[arg(short = 'H', long = "db-host", env = "INFLUXDB_HOST")]
    pub host: Option<String>,

    /// InfluxDB port
    #[arg(short = 'P', long = "db-port", env = "INFLUXDB_PORT")]
    pub port: Option<u16>,

    /// InfluxDB organization
    #[arg(short = 'O', long = "db-org", env = "INFLUXDB_ORG")]
    pub org: Option<String>,

    /// InfluxDB bucket
    #[arg(short = 'B', long = "db-bucket", env = "INFLUXDB_BUCKET")]
    pub bucket: Option<String>,

    /// Measurement to write to or delete from
    #[arg(short = 'M', long = "db-measurement", env = "INFLUXDB_MEASUREMENT")]
    pub measurement: Option<String>,

    /// DuckDB database path (`:memory:` for an in-memory database)
    #[arg(long = "db-connection")]
    pub connection: Option<String>,
}

/// Complete application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

/// Store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store engine type: "influxdb" or "duckdb"
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_org")]
    pub bucket: String,
    /// Measurement replayed samples are written to
    #[serde(default = "default_measurement")]
    pub measurement: String,
    /// Measurement detection results are written to
    #[serde(default = "default_anomaly_measurement")]
    pub anomaly_measurement: String,
    /// DuckDB database path
    #[serde(default)]
    pub connection: String,
    /// Points per write request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How far back the last-sample lookup searches
    #[serde(default = "default_lookback")]
    pub lookback: String,
}

impl StoreConfig {
    /// Base URL of the HTTP store. `host` may carry its own scheme.
    pub fn url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            host: default_host(),
            port: default_port(),
            token: String::new(),
            org: default_org(),
            bucket: default_org(),
            measurement: default_measurement(),
            anomaly_measurement: default_anomaly_measurement(),
            connection: String::new(),
            batch_size: default_batch_size(),
            lookback: default_lookback(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Log file mirrored alongside the console; empty disables it
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: String::new(),
        }
    }
}

/// External detection program configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the input and output paths
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// CSV file detection events are appended to
    #[serde(default = "default_event_log")]
    pub event_log: PathBuf,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            work_dir: default_work_dir(),
            event_log: default_event_log(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>, args: &StoreArgs) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("/etc/fleetsim/config.toml").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FLEETSIM")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_store_args(args);
        Ok(settings)
    }

    /// Override store settings with command-line values
    pub fn apply_store_args(&mut self, args: &StoreArgs) {
        let store = &mut self.store;
        if let Some(engine) = &args.engine {
            store.engine = engine.clone();
        }
        if let Some(token) = &args.token {
            store.token = token.clone();
        }
        if let Some(host) = &args.host {
            store.host = host.clone();
        }
        if let Some(port) = args.port {
            store.port = port;
        }
        if let Some(org) = &args.org {
            store.org = org.clone();
        }
        if let Some(bucket) = &args.bucket {
            store.bucket = bucket.clone();
        }
        if let Some(measurement) = &args.measurement {
            store.measurement = measurement.clone();
        }
        if let Some(connection) = &args.connection {
            store.connection = connection.clone();
        }
    }
}

fn default_engine() -> String {
    "influxdb".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_org() -> String {
    "pdc-mad".to_string()
}

fn default_measurement() -> String {
    "metrics".to_string()
}

fn default_anomaly_measurement() -> String {
    "anomalies".to_string()
}

fn default_batch_size() -> usize {
    5000
}

fn default_lookback() -> String {
    "30d".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_program() -> String {
    "python".to_string()
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_event_log() -> PathBuf {
    PathBuf::from("logs/anomalies.csv")
}
