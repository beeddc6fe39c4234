//! Embedded DuckDB store.
//!
//! Points are kept in one narrow table keyed by measurement, host tag and
//! unix time, one row per field. This mirrors the measurement/tag/field model
//! of the HTTP backend so deletes scope the same way.

use super::{datetime_from_unix, DeleteRequest, Measurements, MetricStore, TimedSample};
use crate::detection::{AnomalyDetectionRecord, DETECTION_FLAGS};
use crate::error::{ReplayError, Result};
use crate::metrics::{MetricSample, MetricSeries};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
    measurements: Measurements,
}

impl DuckDbStore {
    pub fn new_in_memory() -> Result<Self> {
        Self::new_with_options(":memory:", Measurements::default())
    }

    /// Opens `connection` as a database path, or an in-memory database for
    /// `:memory:` and the empty string.
    pub fn new_with_options(connection: &str, measurements: Measurements) -> Result<Self> {
        let conn = if connection.is_empty() || connection == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(connection)?
        };
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            measurements,
        })
    }

    async fn insert_rows(&self, rows: Vec<(&str, &str, i64, &str, f64)>) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO points (measurement, host, time, field, value) VALUES (?, ?, ?, ?, ?)",
            )?;
            for (measurement, host, time, field, value) in rows {
                stmt.execute(params![measurement, host, time, field, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn sample_rows<'a>(
        &'a self,
        host_id: &'a str,
        points: &'a [TimedSample],
    ) -> Vec<(&'a str, &'a str, i64, &'static str, f64)> {
        points
            .iter()
            .flat_map(move |point| {
                let time = point.time.timestamp();
                point.sample.fields().map(move |(spec, value)| {
                    (self.measurements.metrics.as_str(), host_id, time, spec.name, value)
                })
            })
            .collect()
    }
}

#[async_trait]
impl MetricStore for DuckDbStore {
    async fn init(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS points (
                measurement VARCHAR NOT NULL,
                host VARCHAR NOT NULL,
                time BIGINT NOT NULL,
                field VARCHAR NOT NULL,
                value DOUBLE NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_points_series ON points(measurement, host, time);",
        )
        .map_err(|e| ReplayError::store(format!("failed to create points table: {}", e)))
    }

    async fn write_batch(&self, host_id: &str, points: &[TimedSample]) -> Result<()> {
        let rows = self.sample_rows(host_id, points);
        debug!(host = host_id, points = points.len(), rows = rows.len(), "writing batch");
        self.insert_rows(rows).await
    }

    async fn write_one(&self, host_id: &str, point: &TimedSample) -> Result<()> {
        let rows = self.sample_rows(host_id, std::slice::from_ref(point));
        self.insert_rows(rows).await
    }

    async fn last_sample(&self, host_id: &str) -> Result<Option<TimedSample>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT time, field, value FROM points
             WHERE measurement = ? AND host = ? AND time = (
                 SELECT max(time) FROM points WHERE measurement = ? AND host = ?
             )",
        )?;
        let metrics = self.measurements.metrics.as_str();
        let rows = stmt.query_map(params![metrics, host_id, metrics, host_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
        })?;

        let mut time = None;
        let mut values = HashMap::new();
        for row in rows {
            let (t, field, value) = row?;
            time = Some(t);
            values.insert(field, value);
        }
        let Some(time) = time else {
            return Ok(None);
        };
        let sample = MetricSample::from_fields(time, |name| values.get(name).copied())?;
        Ok(Some(TimedSample::new(datetime_from_unix(time)?, sample)))
    }

    async fn delete_range(&self, request: &DeleteRequest) -> Result<()> {
        let conn = self.conn.lock().await;
        let since = request.since.timestamp();
        let until = request.until.timestamp();
        let deleted = match &request.host {
            Some(host) => conn.execute(
                "DELETE FROM points WHERE measurement = ? AND host = ? AND time >= ? AND time <= ?",
                params![request.measurement, host, since, until],
            )?,
            None => conn.execute(
                "DELETE FROM points WHERE measurement = ? AND time >= ? AND time <= ?",
                params![request.measurement, since, until],
            )?,
        };
        debug!(
            measurement = %request.measurement,
            host = ?request.host,
            rows = deleted,
            "deleted points"
        );
        Ok(())
    }

    async fn query_series(&self, host_id: &str, since: DateTime<Utc>) -> Result<MetricSeries> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT time, field, value FROM points
             WHERE measurement = ? AND host = ? AND time >= ?
             ORDER BY time ASC",
        )?;
        let rows = stmt.query_map(
            params![self.measurements.metrics, host_id, since.timestamp()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?)),
        )?;

        let mut by_time: BTreeMap<i64, HashMap<String, f64>> = BTreeMap::new();
        for row in rows {
            let (time, field, value) = row?;
            by_time.entry(time).or_default().insert(field, value);
        }

        let samples = by_time
            .into_iter()
            .map(|(time, values)| MetricSample::from_fields(time, |name| values.get(name).copied()))
            .collect::<Result<Vec<_>>>()?;
        MetricSeries::new(host_id, samples)
    }

    async fn write_detections(
        &self,
        host_id: &str,
        records: &[AnomalyDetectionRecord],
    ) -> Result<()> {
        let anomalies = self.measurements.anomalies.as_str();
        let rows = records
            .iter()
            .flat_map(|record| {
                DETECTION_FLAGS.iter().map(move |(name, flag)| {
                    let value = if flag(record) { 1.0 } else { 0.0 };
                    (anomalies, host_id, record.timestamp, *name, value)
                })
            })
            .collect();
        self.insert_rows(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(secs: i64, cpu_user: f64) -> TimedSample {
        TimedSample::new(
            Utc.timestamp_opt(secs, 0).unwrap(),
            MetricSample {
                timestamp: secs,
                cpu_user,
                sys_mem_total: 16_000_000,
                server_up: 1,
                ..Default::default()
            },
        )
    }

    async fn store() -> DuckDbStore {
        let store = DuckDbStore::new_in_memory().unwrap();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_last_sample_is_latest_point() {
        let store = store().await;
        store
            .write_batch("h1", &[point(1_000, 0.1), point(1_010, 0.2), point(1_020, 0.3)])
            .await
            .unwrap();
        store.write_batch("h2", &[point(5_000, 0.9)]).await.unwrap();

        let last = store.last_sample("h1").await.unwrap().unwrap();
        assert_eq!(last.time.timestamp(), 1_020);
        assert_eq!(last.sample.cpu_user, 0.3);
        assert_eq!(last.sample.sys_mem_total, 16_000_000);
        assert!(store.last_sample("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_series_rebuilds_samples() {
        let store = store().await;
        store
            .write_batch("h1", &[point(1_000, 0.1), point(1_010, 0.2), point(1_020, 0.3)])
            .await
            .unwrap();

        let series = store
            .query_series("h1", Utc.timestamp_opt(1_005, 0).unwrap())
            .await
            .unwrap();
        let ts: Vec<i64> = series.samples().iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![1_010, 1_020]);
        assert!(matches!(
            store.query_series("missing", Utc.timestamp_opt(0, 0).unwrap()).await,
            Err(ReplayError::EmptySeries(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_scopes_by_host_and_measurement() {
        let store = store().await;
        store.write_batch("h1", &[point(1_000, 0.1)]).await.unwrap();
        store.write_batch("h2", &[point(1_000, 0.2)]).await.unwrap();
        let record = AnomalyDetectionRecord {
            timestamp: 1_000,
            cpu_user: true,
            ..Default::default()
        };
        store.write_detections("h1", &[record]).await.unwrap();

        let request = DeleteRequest {
            measurement: "metrics".to_string(),
            host: Some("h1".to_string()),
            since: Utc.timestamp_opt(0, 0).unwrap(),
            until: Utc.timestamp_opt(2_000, 0).unwrap(),
        };
        store.delete_range(&request).await.unwrap();
        assert!(store.last_sample("h1").await.unwrap().is_none());
        assert!(store.last_sample("h2").await.unwrap().is_some());

        let conn = store.conn.lock().await;
        let anomalies: i64 = conn
            .query_row(
                "SELECT count(*) FROM points WHERE measurement = 'anomalies'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(anomalies, DETECTION_FLAGS.len() as i64);
    }

    #[tokio::test]
    async fn test_delete_all_hosts_respects_window() {
        let store = store().await;
        store.write_batch("h1", &[point(100, 0.1), point(900, 0.2)]).await.unwrap();
        store.write_batch("h2", &[point(950, 0.3)]).await.unwrap();

        let request = DeleteRequest {
            measurement: "metrics".to_string(),
            host: None,
            since: Utc.timestamp_opt(500, 0).unwrap(),
            until: Utc.timestamp_opt(1_000, 0).unwrap(),
        };
        store.delete_range(&request).await.unwrap();

        let last = store.last_sample("h1").await.unwrap().unwrap();
        assert_eq!(last.time.timestamp(), 100);
        assert!(store.last_sample("h2").await.unwrap().is_none());
    }
}
