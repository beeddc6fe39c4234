//! Replay engine: batch fill, paced streaming and bulk deletion.
//!
//! The engine loads recorded series, narrows them to the requested window,
//! applies an optional named anomaly and translates relative offsets into
//! absolute insertion times before handing points to the store.
//!
//! Fill and Clean fan out one task per file or host and join them all before
//! returning; a failure in one task never stops its siblings, and every failure
//! is reported in the returned [`ReplayError::Failures`]. Stream is strictly
//! sequential because ordering and pacing are observable.

mod clean;
mod clock;
mod fill;
mod stream;

pub use clean::CleanArgs;
pub use clock::{Clock, SystemClock};
pub use fill::{anchor_to_last, FillArgs};
pub use stream::{pacing_interval, StreamArgs};

use crate::anomaly::{AnomalyInjector, AnomalyWindow};
use crate::error::{ReplayError, Result, TaskFailure};
use crate::metrics::MetricSeries;
use crate::storage::MetricStore;
use chrono::{DateTime, TimeDelta, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

#[derive(Clone)]
pub struct ReplayEngine {
    store: Arc<dyn MetricStore>,
    injector: Arc<AnomalyInjector>,
    clock: Arc<dyn Clock>,
    show_progress: bool,
}

impl ReplayEngine {
    /// Engine with the built-in anomalies, the system clock and no progress bar.
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            store,
            injector: Arc::new(AnomalyInjector::default()),
            clock: Arc::new(SystemClock),
            show_progress: false,
        }
    }

    pub fn with_injector(mut self, injector: AnomalyInjector) -> Self {
        self.injector = Arc::new(injector);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn injector(&self) -> &AnomalyInjector {
        &self.injector
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Loads, windows and perturbs one recorded file.
    fn prepare(
        &self,
        path: &Path,
        host_id: &str,
        start_at: Duration,
        duration: Duration,
        anomaly: &str,
        anomaly_window: Option<AnomalyWindow>,
    ) -> Result<MetricSeries> {
        let mut series = MetricSeries::load(path, host_id)?;
        series.slice_between(start_at, duration)?;
        self.injector.apply(&mut series, anomaly, anomaly_window)?;
        Ok(series)
    }

    fn progress_bar(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message);
        pb
    }
}

/// Joins every task, collecting each failure under its target name.
async fn join_tasks<T>(tasks: Vec<(String, JoinHandle<Result<T>>)>) -> Result<Vec<T>> {
    let mut outputs = Vec::with_capacity(tasks.len());
    let mut failures = Vec::new();
    for (target, task) in tasks {
        match task.await {
            Ok(Ok(output)) => outputs.push(output),
            Ok(Err(e)) => {
                error!(task = %target, error = %e, "task failed");
                failures.push(TaskFailure::new(target, e));
            }
            Err(e) => {
                error!(task = %target, error = %e, "task aborted");
                failures.push(TaskFailure::new(target, ReplayError::Task(e.to_string())));
            }
        }
    }
    if failures.is_empty() {
        Ok(outputs)
    } else {
        Err(ReplayError::Failures(failures))
    }
}

/// Moves `time` by `secs`, failing when the result leaves chrono's range.
pub(crate) fn shift_secs(time: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| time.checked_add_signed(delta))
        .ok_or_else(|| {
            ReplayError::WindowExceedsSeries(format!(
                "shifting {} by {}s leaves the representable time range",
                time, secs
            ))
        })
}

/// Start of a trailing window ending at `now`; `None` reaches back to the epoch.
pub(crate) fn window_start(now: DateTime<Utc>, duration: Option<Duration>) -> DateTime<Utc> {
    let epoch = DateTime::<Utc>::from(std::time::UNIX_EPOCH);
    duration
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .and_then(|d| now.checked_sub_signed(d))
        .map(|since| since.max(epoch))
        .unwrap_or(epoch)
}
