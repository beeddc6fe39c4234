//! Shared fixtures: a recording store, controllable clocks and CSV writers.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fleetsim_core::{
    detection::AnomalyDetectionRecord,
    error::{ReplayError, Result},
    metrics::{MetricSample, METRIC_FIELDS, TIMESTAMP_COLUMN},
    Clock, DeleteRequest, MetricSeries, MetricStore, TimedSample,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    WriteBatch { host: String, points: Vec<TimedSample> },
    WriteOne { host: String, point: TimedSample },
    LastSample { host: String },
    Delete(DeleteRequest),
    QuerySeries { host: String, since: DateTime<Utc> },
    WriteDetections { host: String, records: Vec<AnomalyDetectionRecord> },
}

/// In-memory store that records every call in order.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<StoreCall>>,
    last: Mutex<Option<TimedSample>>,
    series: Mutex<Option<MetricSeries>>,
    failing_hosts: HashSet<String>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_sample(self, last: TimedSample) -> Self {
        *self.last.lock() = Some(last);
        self
    }

    pub fn with_series(self, series: MetricSeries) -> Self {
        *self.series.lock() = Some(series);
        self
    }

    /// Every write or delete for `host` fails with a store error.
    pub fn failing_for(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn batches(&self) -> Vec<(String, Vec<TimedSample>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::WriteBatch { host, points } => Some((host, points)),
                _ => None,
            })
            .collect()
    }

    pub fn single_writes(&self) -> Vec<TimedSample> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::WriteOne { point, .. } => Some(point),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<DeleteRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Delete(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    fn check_host(&self, host: &str) -> Result<()> {
        if self.failing_hosts.contains(host) {
            Err(ReplayError::store(format!("backend rejected {}", host)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetricStore for RecordingStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn write_batch(&self, host_id: &str, points: &[TimedSample]) -> Result<()> {
        self.check_host(host_id)?;
        self.record(StoreCall::WriteBatch {
            host: host_id.to_string(),
            points: points.to_vec(),
        });
        Ok(())
    }

    async fn write_one(&self, host_id: &str, point: &TimedSample) -> Result<()> {
        self.check_host(host_id)?;
        self.record(StoreCall::WriteOne {
            host: host_id.to_string(),
            point: *point,
        });
        *self.last.lock() = Some(*point);
        Ok(())
    }

    async fn last_sample(&self, host_id: &str) -> Result<Option<TimedSample>> {
        self.record(StoreCall::LastSample {
            host: host_id.to_string(),
        });
        Ok(*self.last.lock())
    }

    async fn delete_range(&self, request: &DeleteRequest) -> Result<()> {
        if let Some(host) = &request.host {
            self.check_host(host)?;
        }
        self.record(StoreCall::Delete(request.clone()));
        Ok(())
    }

    async fn query_series(&self, host_id: &str, since: DateTime<Utc>) -> Result<MetricSeries> {
        self.record(StoreCall::QuerySeries {
            host: host_id.to_string(),
            since,
        });
        self.series
            .lock()
            .clone()
            .ok_or_else(|| ReplayError::EmptySeries(host_id.to_string()))
    }

    async fn write_detections(
        &self,
        host_id: &str,
        records: &[AnomalyDetectionRecord],
    ) -> Result<()> {
        self.record(StoreCall::WriteDetections {
            host: host_id.to_string(),
            records: records.to_vec(),
        });
        Ok(())
    }
}

/// Clock frozen at one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Clock advancing with tokio time, so paused-time tests see sleeps elapse.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap();
        self.base + elapsed
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Reference "now" used across tests.
pub const T: i64 = 1_700_000_000;

pub fn csv_header() -> String {
    std::iter::once(TIMESTAMP_COLUMN)
        .chain(METRIC_FIELDS.iter().map(|f| f.name))
        .collect::<Vec<_>>()
        .join(",")
}

/// Writes `<dir>/<host>.csv` with one row per timestamp.
pub fn write_series(dir: &Path, host: &str, timestamps: &[i64]) -> PathBuf {
    let mut text = csv_header();
    for ts in timestamps {
        let sample = MetricSample {
            timestamp: *ts,
            load_1m: 0.5,
            sys_mem_total: 16_384,
            cpu_user: 0.25,
            server_up: 1,
            ..Default::default()
        };
        let mut cols = vec![ts.to_string()];
        cols.extend(sample.fields().map(|(_, value)| value.to_string()));
        text.push('\n');
        text.push_str(&cols.join(","));
    }
    text.push('\n');

    let path = dir.join(format!("{}.csv", host));
    std::fs::write(&path, text).unwrap();
    path
}

/// Writes a file with the right header but an unparsable value.
pub fn write_malformed(dir: &Path, host: &str) -> PathBuf {
    let path = write_series(dir, host, &[0, 10]);
    let text = std::fs::read_to_string(&path).unwrap().replacen("\n10,0.5,", "\n10,oops,", 1);
    std::fs::write(&path, text).unwrap();
    path
}

pub fn times(points: &[TimedSample]) -> Vec<i64> {
    points.iter().map(|p| p.time.timestamp()).collect()
}
