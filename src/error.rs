//! Error types for the replay engine.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A specialized Result type for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

/// The error type for replay, store and detection operations.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("path is a directory: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("not a CSV file: {}", .0.display())]
    NotCsv(PathBuf),

    #[error("file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    /// Malformed CSV content, missing columns or unparsable values
    #[error("parse error: {0}")]
    Parse(String),

    #[error("series contains no samples: {0}")]
    EmptySeries(String),

    #[error("window exceeds recorded series: {0}")]
    WindowExceedsSeries(String),

    #[error("unknown anomaly: {0}")]
    UnknownAnomaly(String),

    #[error("unknown detection algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stream's running insertion clock overtook the wall clock
    #[error("exceeded current time: next insertion at {insert_at} is after {now}")]
    PacingExceeded {
        insert_at: chrono::DateTime<chrono::Utc>,
        now: chrono::DateTime<chrono::Utc>,
    },

    #[error("no stored samples for host {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("a detection run is already in progress")]
    DetectionInProgress,

    #[error("detection failed: {0}")]
    Detection(String),

    /// A spawned task panicked or was cancelled
    #[error("task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// One entry per failed file or host of a concurrent fan-out
    #[error("{} task(s) failed: {}", .0.len(), DisplayFailures(.0))]
    Failures(Vec<TaskFailure>),
}

/// A failure of one file or host inside a concurrent fan-out.
#[derive(Debug)]
pub struct TaskFailure {
    pub target: String,
    pub error: ReplayError,
}

impl TaskFailure {
    pub fn new(target: impl Into<String>, error: ReplayError) -> Self {
        Self {
            target: target.into(),
            error,
        }
    }
}

struct DisplayFailures<'a>(&'a [TaskFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.target, failure.error)?;
        }
        Ok(())
    }
}

impl ReplayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        ReplayError::Configuration(msg.into())
    }

    /// Create a store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        ReplayError::Store(msg.into())
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        ReplayError::Parse(msg.into())
    }
}

impl From<csv::Error> for ReplayError {
    fn from(err: csv::Error) -> Self {
        ReplayError::Parse(err.to_string())
    }
}

impl From<duckdb::Error> for ReplayError {
    fn from(err: duckdb::Error) -> Self {
        ReplayError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for ReplayError {
    fn from(err: reqwest::Error) -> Self {
        ReplayError::Store(err.to_string())
    }
}

impl From<config::ConfigError> for ReplayError {
    fn from(err: config::ConfigError) -> Self {
        ReplayError::Configuration(err.to_string())
    }
}
