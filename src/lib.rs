//! Metric replay engine for simulating a fleet of monitored hosts.
//!
//! Recorded per-host metric CSVs are loaded into a [`MetricSeries`], narrowed to
//! a time window, optionally perturbed with a named anomaly, and written to a
//! time-series store either as one batch per host ([`ReplayEngine::fill`]), as a
//! paced real-time stream ([`ReplayEngine::stream`]), or removed again
//! ([`ReplayEngine::clean`]).

pub mod anomaly;
pub mod cli;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use anomaly::{AnomalyInjector, AnomalyWindow};
pub use config::Settings;
pub use engine::{CleanArgs, Clock, FillArgs, ReplayEngine, StreamArgs, SystemClock};
pub use error::{ReplayError, Result};
pub use metrics::{MetricSample, MetricSeries};
pub use storage::{DeleteRequest, MetricStore, StoreBackendType, TimedSample};
