//! Time-series store backends for replayed metrics.
//!
//! This module provides the store implementations the replay engine writes to:
//! - `influxdb`: InfluxDB v2 over its HTTP API
//! - `duckdb`: embedded DuckDB, for offline replays and tests
//!
//! Each backend implements the `MetricStore` trait. Points are tagged with the
//! host id and written to the configured metrics measurement; deletes always
//! name the measurement they target.

pub mod duckdb;
pub mod influxdb;
pub mod line_protocol;

use self::{duckdb::DuckDbStore, influxdb::InfluxDbStore};
use crate::config::StoreConfig;
use crate::detection::AnomalyDetectionRecord;
use crate::error::{ReplayError, Result};
use crate::metrics::{parse_duration_string, MetricSample, MetricSeries};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Credentials for store authentication
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
}

/// A sample pinned to its absolute insertion time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub time: DateTime<Utc>,
    pub sample: MetricSample,
}

impl TimedSample {
    pub fn new(time: DateTime<Utc>, sample: MetricSample) -> Self {
        Self { time, sample }
    }
}

/// Predicate-scoped delete over `[since, until]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub measurement: String,
    /// `None` deletes every host in the measurement.
    pub host: Option<String>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Measurements a store writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurements {
    pub metrics: String,
    pub anomalies: String,
}

impl Default for Measurements {
    fn default() -> Self {
        Self {
            metrics: "metrics".to_string(),
            anomalies: "anomalies".to_string(),
        }
    }
}

/// Store interface consumed by the replay engine and detection runs.
#[async_trait]
pub trait MetricStore: Send + Sync + 'static {
    /// Prepare the backend (schema creation, connectivity checks).
    async fn init(&self) -> Result<()>;

    /// Submit every point of a host's batch and flush once all are submitted.
    async fn write_batch(&self, host_id: &str, points: &[TimedSample]) -> Result<()>;

    /// Write one point and wait for the store to confirm it.
    async fn write_one(&self, host_id: &str, point: &TimedSample) -> Result<()>;

    /// Most recent point stored for a host, by wall-clock time.
    async fn last_sample(&self, host_id: &str) -> Result<Option<TimedSample>>;

    async fn delete_range(&self, request: &DeleteRequest) -> Result<()>;

    /// Stored points of a host since `since`, with absolute unix timestamps.
    async fn query_series(&self, host_id: &str, since: DateTime<Utc>) -> Result<MetricSeries>;

    /// Persist detection flags to the anomaly measurement.
    async fn write_detections(
        &self,
        host_id: &str,
        records: &[AnomalyDetectionRecord],
    ) -> Result<()>;
}

/// Converts unix seconds to a UTC timestamp.
pub(crate) fn datetime_from_unix(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ReplayError::store(format!("timestamp out of range: {}", secs)))
}

pub enum StoreBackendType {
    DuckDb(DuckDbStore),
    InfluxDb(InfluxDbStore),
}

impl StoreBackendType {
    /// Builds the backend named by `config.engine`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let measurements = Measurements {
            metrics: config.measurement.clone(),
            anomalies: config.anomaly_measurement.clone(),
        };
        match config.engine.as_str() {
            "duckdb" => Ok(StoreBackendType::DuckDb(DuckDbStore::new_with_options(
                &config.connection,
                measurements,
            )?)),
            "influxdb" => {
                let credentials = Credentials {
                    token: Some(config.token.clone()).filter(|t| !t.is_empty()),
                };
                Ok(StoreBackendType::InfluxDb(InfluxDbStore::new_with_options(
                    &config.url(),
                    &config.org,
                    &config.bucket,
                    measurements,
                    config.batch_size,
                    &credentials,
                )?
                .with_lookback(parse_duration_string(&config.lookback)?)))
            }
            other => Err(ReplayError::config(format!("invalid store engine '{}'", other))),
        }
    }

    pub fn into_shared(self) -> Arc<dyn MetricStore> {
        match self {
            StoreBackendType::DuckDb(store) => Arc::new(store),
            StoreBackendType::InfluxDb(store) => Arc::new(store),
        }
    }
}

impl AsRef<dyn MetricStore> for StoreBackendType {
    fn as_ref(&self) -> &(dyn MetricStore + 'static) {
        match self {
            StoreBackendType::DuckDb(store) => store,
            StoreBackendType::InfluxDb(store) => store,
        }
    }
}

#[async_trait]
impl MetricStore for StoreBackendType {
    async fn init(&self) -> Result<()> {
        self.as_ref().init().await
    }

    async fn write_batch(&self, host_id: &str, points: &[TimedSample]) -> Result<()> {
        self.as_ref().write_batch(host_id, points).await
    }

    async fn write_one(&self, host_id: &str, point: &TimedSample) -> Result<()> {
        self.as_ref().write_one(host_id, point).await
    }

    async fn last_sample(&self, host_id: &str) -> Result<Option<TimedSample>> {
        self.as_ref().last_sample(host_id).await
    }

    async fn delete_range(&self, request: &DeleteRequest) -> Result<()> {
        self.as_ref().delete_range(request).await
    }

    async fn query_series(&self, host_id: &str, since: DateTime<Utc>) -> Result<MetricSeries> {
        self.as_ref().query_series(host_id, since).await
    }

    async fn write_detections(
        &self,
        host_id: &str,
        records: &[AnomalyDetectionRecord],
    ) -> Result<()> {
        self.as_ref().write_detections(host_id, records).await
    }
}
