//! InfluxDB v2 store over the HTTP API.

use super::line_protocol::{encode_detection, encode_sample};
use super::{datetime_from_unix, Credentials, DeleteRequest, Measurements, MetricStore, TimedSample};
use crate::detection::AnomalyDetectionRecord;
use crate::error::{ReplayError, Result};
use crate::metrics::{MetricSample, MetricSeries};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BATCH_SIZE: usize = 5_000;

pub struct InfluxDbStore {
    client: Client,
    url: String,
    org: String,
    bucket: String,
    token: String,
    measurements: Measurements,
    batch_size: usize,
    lookback: Duration,
}

impl InfluxDbStore {
    pub fn new_with_options(
        url: &str,
        org: &str,
        bucket: &str,
        measurements: Measurements,
        batch_size: usize,
        credentials: &Credentials,
    ) -> Result<Self> {
        let token = credentials
            .token
            .clone()
            .ok_or_else(|| ReplayError::config("missing InfluxDB token"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            org: org.to_string(),
            bucket: bucket.to_string(),
            token,
            measurements,
            batch_size: if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size },
            lookback: Duration::from_secs(30 * 86_400),
        })
    }

    /// Sets how far back `last_sample` searches.
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.url, path))
            .header("Authorization", format!("Token {}", self.token))
    }

    async fn write_lines(&self, body: String) -> Result<()> {
        let response = self
            .post("/api/v2/write")
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        check_status(response, "write").await.map(|_| ())
    }

    async fn query(&self, flux: String) -> Result<String> {
        debug!(query = %flux, "running flux query");
        let response = self
            .post("/api/v2/query")
            .query(&[("org", self.org.as_str())])
            .header("Accept", "application/csv")
            .header("Content-Type", "application/vnd.flux")
            .body(flux)
            .send()
            .await?;
        let response = check_status(response, "query").await?;
        Ok(response.text().await?)
    }

    fn last_sample_flux(&self, host_id: &str) -> String {
        format!(
            "from(bucket: \"{}\")\n  |> range(start: -{}s)\n  |> filter(fn: (r) => r._measurement == \"{}\" and r.host == \"{}\")\n  |> last()\n  |> pivot(rowKey: [\"_time\"], columnKey: [\"_field\"], valueColumn: \"_value\")",
            flux_string(&self.bucket),
            self.lookback.as_secs(),
            flux_string(&self.measurements.metrics),
            flux_string(host_id)
        )
    }

    fn series_flux(&self, host_id: &str, since: DateTime<Utc>) -> String {
        format!(
            "from(bucket: \"{}\")\n  |> range(start: {})\n  |> filter(fn: (r) => r._measurement == \"{}\" and r.host == \"{}\")\n  |> pivot(rowKey: [\"_time\"], columnKey: [\"_field\"], valueColumn: \"_value\")\n  |> sort(columns: [\"_time\"])",
            flux_string(&self.bucket),
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
            flux_string(&self.measurements.metrics),
            flux_string(host_id)
        )
    }
}

async fn check_status(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ReplayError::store(format!(
        "{} failed with {}: {}",
        action,
        status,
        body.trim()
    )))
}

fn flux_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Predicate for the delete API, scoped by measurement and optionally host.
pub(crate) fn delete_predicate(request: &DeleteRequest) -> String {
    let mut predicate = format!("_measurement=\"{}\"", flux_string(&request.measurement));
    if let Some(host) = &request.host {
        predicate.push_str(&format!(" AND host=\"{}\"", flux_string(host)));
    }
    predicate
}

fn is_meta_column(name: &str) -> bool {
    name.is_empty() || name.starts_with('_') || matches!(name, "result" | "table" | "host")
}

/// Parses pivoted query CSV into rows of `(unix time, field values)`.
///
/// Each result table carries its own header row; blank lines and annotation
/// rows are skipped.
pub(crate) fn parse_pivot_csv(body: &str) -> Result<Vec<(i64, HashMap<String, f64>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut header: Option<csv::StringRecord> = None;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.get(0).map(|c| c.starts_with('#')).unwrap_or(false) {
            continue;
        }
        if record.iter().any(|cell| cell == "_time") {
            header = Some(record);
            continue;
        }
        let Some(header) = &header else {
            continue;
        };

        let mut time = None;
        let mut values = HashMap::new();
        for (name, cell) in header.iter().zip(record.iter()) {
            if name == "_time" {
                let parsed = DateTime::parse_from_rfc3339(cell)
                    .map_err(|e| ReplayError::store(format!("invalid _time '{}': {}", cell, e)))?;
                time = Some(parsed.timestamp());
            } else if !is_meta_column(name) {
                if let Ok(value) = cell.parse::<f64>() {
                    values.insert(name.to_string(), value);
                }
            }
        }
        if let Some(time) = time {
            rows.push((time, values));
        }
    }
    Ok(rows)
}

#[async_trait]
impl MetricStore for InfluxDbStore {
    async fn init(&self) -> Result<()> {
        let response = self.client.get(format!("{}/health", self.url)).send().await?;
        check_status(response, "health check").await?;
        info!(url = %self.url, bucket = %self.bucket, "connected to InfluxDB");
        Ok(())
    }

    async fn write_batch(&self, host_id: &str, points: &[TimedSample]) -> Result<()> {
        let lines: Vec<String> = points
            .iter()
            .map(|p| encode_sample(&self.measurements.metrics, host_id, p))
            .collect();
        let submissions = lines
            .chunks(self.batch_size)
            .map(|chunk| self.write_lines(chunk.join("\n")));
        try_join_all(submissions).await?;
        debug!(host = host_id, points = points.len(), "flushed batch");
        Ok(())
    }

    async fn write_one(&self, host_id: &str, point: &TimedSample) -> Result<()> {
        self.write_lines(encode_sample(&self.measurements.metrics, host_id, point))
            .await
    }

    async fn last_sample(&self, host_id: &str) -> Result<Option<TimedSample>> {
        let body = self.query(self.last_sample_flux(host_id)).await?;
        let Some((time, values)) = parse_pivot_csv(&body)?
            .into_iter()
            .max_by_key(|(time, _)| *time)
        else {
            return Ok(None);
        };
        let sample = MetricSample::from_fields(time, |name| values.get(name).copied())?;
        Ok(Some(TimedSample::new(datetime_from_unix(time)?, sample)))
    }

    async fn delete_range(&self, request: &DeleteRequest) -> Result<()> {
        let body = json!({
            "start": request.since.to_rfc3339_opts(SecondsFormat::Secs, true),
            "stop": request.until.to_rfc3339_opts(SecondsFormat::Secs, true),
            "predicate": delete_predicate(request),
        });
        let response = self
            .post("/api/v2/delete")
            .query(&[("org", self.org.as_str()), ("bucket", self.bucket.as_str())])
            .json(&body)
            .send()
            .await?;
        check_status(response, "delete").await?;
        Ok(())
    }

    async fn query_series(&self, host_id: &str, since: DateTime<Utc>) -> Result<MetricSeries> {
        let body = self.query(self.series_flux(host_id, since)).await?;
        let samples = parse_pivot_csv(&body)?
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
        if records.is_empty() {
            return Ok(());
        }
        let body = records
            .iter()
            .map(|r| encode_detection(&self.measurements.anomalies, host_id, r))
            .collect::<Vec<_>>()
            .join("\n");
        self.write_lines(body).await
    }
}
