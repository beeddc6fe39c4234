//! Loading and windowing of a host's recorded metric series.

use super::{MetricSample, METRIC_FIELDS, TIMESTAMP_COLUMN};
use crate::error::{ReplayError, Result};
use crate::metrics::duration::as_offset_secs;
use std::io;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Checks that `path` names a non-empty `.csv` file.
pub fn validate_file(path: &Path) -> Result<()> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ReplayError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        return Err(ReplayError::IsDirectory(path.to_path_buf()));
    }
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(ReplayError::NotCsv(path.to_path_buf()));
    }
    if meta.len() == 0 {
        return Err(ReplayError::EmptyFile(path.to_path_buf()));
    }
    Ok(())
}

/// Host id for a recorded file: its base name without extension.
pub fn host_id_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Ordered, non-empty samples of one host.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    host_id: String,
    samples: Vec<MetricSample>,
}

impl MetricSeries {
    /// Creates a series, rejecting empty or out-of-order samples.
    pub fn new(host_id: impl Into<String>, samples: Vec<MetricSample>) -> Result<Self> {
        let host_id = host_id.into();
        if samples.is_empty() {
            return Err(ReplayError::EmptySeries(host_id));
        }
        if let Some(pos) = samples.windows(2).position(|w| w[1].timestamp < w[0].timestamp) {
            return Err(ReplayError::parse(format!(
                "{}: timestamp {} at sample {} precedes {}",
                host_id,
                samples[pos + 1].timestamp,
                pos + 1,
                samples[pos].timestamp
            )));
        }
        Ok(Self { host_id, samples })
    }

    /// Loads a recorded CSV after validating the path.
    pub fn load(path: impl AsRef<Path>, host_id: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        validate_file(path)?;
        let file = std::fs::File::open(path)?;
        Self::from_reader(host_id, file)
    }

    /// Parses CSV content whose header names the fixed field set.
    pub fn from_reader<R: io::Read>(host_id: impl Into<String>, reader: R) -> Result<Self> {
        let host_id = host_id.into();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let required = std::iter::once(TIMESTAMP_COLUMN).chain(METRIC_FIELDS.iter().map(|f| f.name));
        for column in required {
            if !headers.iter().any(|h| h == column) {
                return Err(ReplayError::parse(format!(
                    "{}: missing column '{}'",
                    host_id, column
                )));
            }
        }
        if headers.len() > METRIC_FIELDS.len() + 1 {
            debug!(host = %host_id, columns = headers.len(), "ignoring unknown CSV columns");
        }

        let mut samples = Vec::new();
        for row in reader.deserialize::<MetricSample>() {
            samples.push(row?);
        }
        Self::new(host_id, samples)
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Mutable access to sample values. The series length cannot change through it.
    pub fn samples_mut(&mut self) -> &mut [MetricSample] {
        &mut self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> &MetricSample {
        &self.samples[0]
    }

    pub fn last(&self) -> &MetricSample {
        &self.samples[self.samples.len() - 1]
    }

    /// Index range selected by a `start_at`/`duration` window.
    ///
    /// The range begins at the first sample with `timestamp >= start_at`. A zero
    /// duration, or a window reaching past the last sample, runs to the end.
    /// Otherwise the range stops before the first sample with
    /// `timestamp >= start_at + duration`.
    pub fn window(&self, start_at: Duration, duration: Duration) -> Result<Range<usize>> {
        let start = as_offset_secs(start_at)?;
        let span = as_offset_secs(duration)?;
        let last_ts = self.last().timestamp;

        if start > last_ts {
            return Err(ReplayError::WindowExceedsSeries(format!(
                "{}: start offset {}s is beyond the last sample at {}s",
                self.host_id, start, last_ts
            )));
        }

        let begin = self.samples.partition_point(|s| s.timestamp < start);
        let end_offset = start.saturating_add(span);
        let end = if span == 0 || end_offset > last_ts {
            self.samples.len()
        } else {
            self.samples.partition_point(|s| s.timestamp < end_offset)
        };

        if begin >= end {
            return Err(ReplayError::WindowExceedsSeries(format!(
                "{}: no samples between {}s and {}s",
                self.host_id, start, end_offset
            )));
        }
        Ok(begin..end)
    }

    /// Narrows the series to the samples selected by [`MetricSeries::window`].
    pub fn slice_between(&mut self, start_at: Duration, duration: Duration) -> Result<()> {
        if start_at.is_zero() && duration.is_zero() {
            return Ok(());
        }
        let range = self.window(start_at, duration)?;
        self.samples.truncate(range.end);
        self.samples.drain(..range.start);
        debug!(
            host = %self.host_id,
            samples = self.samples.len(),
            first = self.first().timestamp,
            last = self.last().timestamp,
            "sliced series"
        );
        Ok(())
    }

    /// Seconds between sample `index` and the one after it.
    pub fn delta_after(&self, index: usize) -> Option<i64> {
        let next = self.samples.get(index + 1)?;
        Some(next.timestamp - self.samples[index].timestamp)
    }

    /// Writes the series as CSV with the standard header.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for sample in &self.samples {
            writer.serialize(sample)?;
        }
        writer.flush()?;
        Ok(())
    }
}
