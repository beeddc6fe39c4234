//! Detection output rows and the flattened events logged from them.

use crate::error::{ReplayError, Result};
use crate::metrics::TIMESTAMP_COLUMN;
use serde::Serialize;
use std::io;
use std::path::Path;

/// Per-timestamp anomaly flags, one per metric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnomalyDetectionRecord {
    pub timestamp: i64,
    pub load_1m: bool,
    pub load_5m: bool,
    pub load_15m: bool,
    pub sys_mem_swap_total: bool,
    pub sys_mem_swap_free: bool,
    pub sys_mem_free: bool,
    pub sys_mem_cache: bool,
    pub sys_mem_buffered: bool,
    pub sys_mem_available: bool,
    pub sys_mem_total: bool,
    pub sys_fork_rate: bool,
    pub sys_interrupt_rate: bool,
    pub sys_context_switch_rate: bool,
    pub sys_thermal: bool,
    pub disk_io_time: bool,
    pub disk_bytes_read: bool,
    pub disk_bytes_written: bool,
    pub disk_io_read: bool,
    pub disk_io_write: bool,
    pub cpu_iowait: bool,
    pub cpu_system: bool,
    pub cpu_user: bool,
    pub server_up: bool,
}

/// One flagged `(timestamp, host, metric)` with the algorithm's description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyEvent {
    pub timestamp: i64,
    pub host: String,
    pub metric: String,
    pub comment: String,
}

pub type FlagAccessor = fn(&AnomalyDetectionRecord) -> bool;
type FlagSetter = fn(&mut AnomalyDetectionRecord, bool);

macro_rules! flags {
    ($(($name:literal, $member:ident)),* $(,)?) => {
        /// Metric name and flag accessor for every detection column.
        pub static DETECTION_FLAGS: [(&str, FlagAccessor); 23] = [
            $(($name, |r| r.$member)),*
        ];

        static FLAG_SETTERS: [(&str, FlagSetter); 23] = [
            $(($name, |r, v| r.$member = v)),*
        ];
    };
}

flags![
    ("load-1m", load_1m),
    ("load-5m", load_5m),
    ("load-15m", load_15m),
    ("sys-mem-swap-total", sys_mem_swap_total),
    ("sys-mem-swap-free", sys_mem_swap_free),
    ("sys-mem-free", sys_mem_free),
    ("sys-mem-cache", sys_mem_cache),
    ("sys-mem-buffered", sys_mem_buffered),
    ("sys-mem-available", sys_mem_available),
    ("sys-mem-total", sys_mem_total),
    ("sys-fork-rate", sys_fork_rate),
    ("sys-interrupt-rate", sys_interrupt_rate),
    ("sys-context-switch-rate", sys_context_switch_rate),
    ("sys-thermal", sys_thermal),
    ("disk-io-time", disk_io_time),
    ("disk-bytes-read", disk_bytes_read),
    ("disk-bytes-written", disk_bytes_written),
    ("disk-io-read", disk_io_read),
    ("disk-io-write", disk_io_write),
    ("cpu-iowait", cpu_iowait),
    ("cpu-system", cpu_system),
    ("cpu-user", cpu_user),
    ("server-up", server_up),
];

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl AnomalyDetectionRecord {
    /// Expands the record into one event per raised flag.
    pub fn flatten(&self, host: &str, comment: &str) -> Vec<AnomalyEvent> {
        DETECTION_FLAGS
            .iter()
            .filter(|(_, flag)| flag(self))
            .map(|(metric, _)| AnomalyEvent {
                timestamp: self.timestamp,
                host: host.to_string(),
                metric: metric.to_string(),
                comment: comment.to_string(),
            })
            .collect()
    }
}

/// Parses detection output CSV: a `timestamp` column and one flag column per metric.
pub fn parse_detection_csv<R: io::Read>(reader: R) -> Result<Vec<AnomalyDetectionRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReplayError::parse(format!("detection output missing column '{}'", name)))
    };

    let ts_index = column(TIMESTAMP_COLUMN)?;
    let flag_indexes = FLAG_SETTERS
        .iter()
        .map(|(name, set)| Ok((*name, column(*name)?, *set)))
        .collect::<Result<Vec<_>>>()?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let cell = |i: usize| record.get(i).unwrap_or_default();
        let mut parsed = AnomalyDetectionRecord {
            timestamp: cell(ts_index).parse().map_err(|_| {
                ReplayError::parse(format!("row {}: invalid timestamp '{}'", row + 1, cell(ts_index)))
            })?,
            ..Default::default()
        };
        for (name, index, set) in &flag_indexes {
            let flag = parse_flag(cell(*index)).ok_or_else(|| {
                ReplayError::parse(format!(
                    "row {}: invalid flag '{}' for {}",
                    row + 1,
                    cell(*index),
                    name
                ))
            })?;
            set(&mut parsed, flag);
        }
        records.push(parsed);
    }
    Ok(records)
}

/// Appends events to a CSV log, writing the header only for a new file.
pub fn append_events(path: &Path, events: &[AnomalyEvent]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> String {
        std::iter::once("timestamp")
            .chain(DETECTION_FLAGS.iter().map(|(n, _)| *n))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn row(ts: i64, raised: &[&str]) -> String {
        let mut cols = vec![ts.to_string()];
        cols.extend(DETECTION_FLAGS.iter().map(|(n, _)| {
            if raised.contains(n) { "true" } else { "false" }.to_string()
        }));
        cols.join(",")
    }

    #[test]
    fn test_flatten_emits_one_event_per_flag() {
        let record = AnomalyDetectionRecord {
            timestamp: 1_700_000_000,
            cpu_user: true,
            disk_io_time: true,
            ..Default::default()
        };
        let events = record.flatten("node-1", "Isolation forest");
        let metrics: Vec<&str> = events.iter().map(|e| e.metric.as_str()).collect();
        assert_eq!(metrics, vec!["disk-io-time", "cpu-user"]);
        assert!(events.iter().all(|e| e.host == "node-1" && e.comment == "Isolation forest"));
        assert!(AnomalyDetectionRecord::default().flatten("h", "c").is_empty());
    }

    #[test]
    fn test_parse_detection_csv() {
        let text = format!(
            "{}\n{}\n{}\n",
            header(),
            row(10, &["cpu-user"]),
            row(20, &[])
        )
        .replacen(",true,", ",1,", 1);
        let records = parse_detection_csv(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].cpu_user);
        assert!(!records[0].load_1m);
        assert_eq!(records[1].timestamp, 20);
    }

    #[test]
    fn test_parse_rejects_bad_flag() {
        let text = format!("{}\n{}\n", header(), row(10, &[])).replacen("false", "maybe", 1);
        assert!(matches!(
            parse_detection_csv(text.as_bytes()),
            Err(ReplayError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_column() {
        let err = parse_detection_csv("timestamp,cpu-user\n1,true\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("load-1m"));
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("anomalies.csv");
        let event = AnomalyEvent {
            timestamp: 1,
            host: "h".to_string(),
            metric: "cpu-user".to_string(),
            comment: "Isolation forest".to_string(),
        };
        append_events(&path, &[event.clone()]).unwrap();
        append_events(&path, &[event]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,host,metric,comment");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "1,h,cpu-user,Isolation forest");
    }
}
