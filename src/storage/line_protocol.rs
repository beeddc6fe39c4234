//! InfluxDB line protocol encoding at second precision.

use super::TimedSample;
use crate::detection::{AnomalyDetectionRecord, DETECTION_FLAGS};
use crate::metrics::FieldKind;
use std::fmt::Write;

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_measurement(value: &str) -> String {
    escape(value, &[',', ' '])
}

/// Escaping shared by tag keys, tag values and field keys.
fn escape_key(value: &str) -> String {
    escape(value, &[',', ' ', '='])
}

fn line_prefix(measurement: &str, host_id: &str) -> String {
    format!("{},host={} ", escape_measurement(measurement), escape_key(host_id))
}

/// Encodes a metric sample. Non-finite float values are left out.
pub fn encode_sample(measurement: &str, host_id: &str, point: &TimedSample) -> String {
    let mut line = line_prefix(measurement, host_id);
    let mut first = true;
    for (spec, value) in point.sample.fields() {
        if spec.kind == FieldKind::Float && !value.is_finite() {
            continue;
        }
        if !first {
            line.push(',');
        }
        first = false;
        let _ = match spec.kind {
            FieldKind::Int => write!(line, "{}={}i", escape_key(spec.name), value as i64),
            FieldKind::Float => write!(line, "{}={}", escape_key(spec.name), value),
        };
    }
    let _ = write!(line, " {}", point.time.timestamp());
    line
}

/// Encodes detection flags as boolean fields at the record's timestamp.
pub fn encode_detection(measurement: &str, host_id: &str, record: &AnomalyDetectionRecord) -> String {
    let fields: Vec<String> = DETECTION_FLAGS
        .iter()
        .map(|(name, flag)| format!("{}={}", escape_key(name), flag(record)))
        .collect();
    format!(
        "{}{} {}",
        line_prefix(measurement, host_id),
        fields.join(","),
        record.timestamp
    )
}
