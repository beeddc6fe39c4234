//! Host metric samples and the series model replayed into the store.
//!
//! A [`MetricSample`] is one row of a recorded host CSV. Its `timestamp` is a
//! relative offset in seconds from the start of the recording until the replay
//! engine translates it to wall-clock time. The set of fields is fixed and is
//! enumerated once in [`METRIC_FIELDS`], which drives store encoding, decoding
//! and detection-flag flattening.

pub mod duration;
pub mod series;

pub use duration::{parse_duration_string, parse_optional_duration};
pub use series::{host_id_from_path, validate_file, MetricSeries};

use crate::error::{ReplayError, Result};
use serde::{Deserialize, Serialize};

/// Name of the timestamp column in recorded and exported CSVs.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// One measurement of a host at one relative offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetricSample {
    pub timestamp: i64,
    pub load_1m: f64,
    pub load_5m: f64,
    pub load_15m: f64,
    pub sys_mem_swap_total: i64,
    pub sys_mem_swap_free: i64,
    pub sys_mem_free: i64,
    pub sys_mem_cache: i64,
    pub sys_mem_buffered: i64,
    pub sys_mem_available: i64,
    pub sys_mem_total: i64,
    pub sys_fork_rate: f64,
    pub sys_interrupt_rate: f64,
    pub sys_context_switch_rate: f64,
    pub sys_thermal: f64,
    pub disk_io_time: f64,
    pub disk_bytes_read: f64,
    pub disk_bytes_written: f64,
    pub disk_io_read: f64,
    pub disk_io_write: f64,
    pub cpu_iowait: f64,
    pub cpu_system: f64,
    pub cpu_user: f64,
    pub server_up: i64,
}

/// Storage type of a metric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
}

/// Name and accessors of one metric field.
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    get: fn(&MetricSample) -> f64,
    set: fn(&mut MetricSample, f64),
}

impl FieldSpec {
    pub fn get(&self, sample: &MetricSample) -> f64 {
        (self.get)(sample)
    }

    pub fn set(&self, sample: &mut MetricSample, value: f64) {
        (self.set)(sample, value)
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

macro_rules! field_spec {
    ($name:literal, $member:ident, Float) => {
        FieldSpec {
            name: $name,
            kind: FieldKind::Float,
            get: |s| s.$member,
            set: |s, v| s.$member = v,
        }
    };
    ($name:literal, $member:ident, Int) => {
        FieldSpec {
            name: $name,
            kind: FieldKind::Int,
            get: |s| s.$member as f64,
            set: |s, v| s.$member = v.round() as i64,
        }
    };
}

/// Every metric field except `timestamp`, in CSV column order.
pub static METRIC_FIELDS: [FieldSpec; 23] = [
    field_spec!("load-1m", load_1m, Float),
    field_spec!("load-5m", load_5m, Float),
    field_spec!("load-15m", load_15m, Float),
    field_spec!("sys-mem-swap-total", sys_mem_swap_total, Int),
    field_spec!("sys-mem-swap-free", sys_mem_swap_free, Int),
    field_spec!("sys-mem-free", sys_mem_free, Int),
    field_spec!("sys-mem-cache", sys_mem_cache, Int),
    field_spec!("sys-mem-buffered", sys_mem_buffered, Int),
    field_spec!("sys-mem-available", sys_mem_available, Int),
    field_spec!("sys-mem-total", sys_mem_total, Int),
    field_spec!("sys-fork-rate", sys_fork_rate, Float),
    field_spec!("sys-interrupt-rate", sys_interrupt_rate, Float),
    field_spec!("sys-context-switch-rate", sys_context_switch_rate, Float),
    field_spec!("sys-thermal", sys_thermal, Float),
    field_spec!("disk-io-time", disk_io_time, Float),
    field_spec!("disk-bytes-read", disk_bytes_read, Float),
    field_spec!("disk-bytes-written", disk_bytes_written, Float),
    field_spec!("disk-io-read", disk_io_read, Float),
    field_spec!("disk-io-write", disk_io_write, Float),
    field_spec!("cpu-iowait", cpu_iowait, Float),
    field_spec!("cpu-system", cpu_system, Float),
    field_spec!("cpu-user", cpu_user, Float),
    field_spec!("server-up", server_up, Int),
];

/// Looks up a field by its column name.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    METRIC_FIELDS.iter().find(|f| f.name == name)
}

impl MetricSample {
    /// Rebuilds a sample from named values, e.g. a row read back from the store.
    ///
    /// Every field in [`METRIC_FIELDS`] must be present.
    pub fn from_fields<F>(timestamp: i64, mut lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let mut sample = MetricSample {
            timestamp,
            ..Default::default()
        };
        for spec in METRIC_FIELDS.iter() {
            let value = lookup(spec.name)
                .ok_or_else(|| ReplayError::parse(format!("missing field '{}'", spec.name)))?;
            spec.set(&mut sample, value);
        }
        Ok(sample)
    }

    /// Iterates `(name, value)` over every metric field.
    pub fn fields(&self) -> impl Iterator<Item = (&'static FieldSpec, f64)> + '_ {
        METRIC_FIELDS.iter().map(move |spec| (spec, spec.get(self)))
    }
}
