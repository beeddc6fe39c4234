use super::{join_tasks, shift_secs, ReplayEngine};
use crate::anomaly::AnomalyWindow;
use crate::error::{ReplayError, Result};
use crate::metrics::duration::as_offset_secs;
use crate::metrics::{host_id_from_path, MetricSeries};
use crate::storage::TimedSample;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Parameters of a batch load.
#[derive(Debug, Clone, Default)]
pub struct FillArgs {
    pub files: Vec<PathBuf>,
    pub start_at: Duration,
    /// Zero replays to the end of each series
    pub duration: Duration,
    /// Distance between the last replayed sample and now
    pub gap: Duration,
    /// Anomaly name; empty for none
    pub anomaly: String,
    pub anomaly_window: Option<AnomalyWindow>,
}

/// Pins the last sample at `now - gap` and places every other sample by its
/// offset from the last one.
pub fn anchor_to_last(
    series: &MetricSeries,
    now: DateTime<Utc>,
    gap: Duration,
) -> Result<Vec<TimedSample>> {
    let gap_secs = as_offset_secs(gap)?;
    let last_ts = series.last().timestamp;
    if gap_secs > last_ts {
        return Err(ReplayError::config(format!(
            "{}: gap of {}s exceeds the series length of {}s",
            series.host_id(),
            gap_secs,
            last_ts
        )));
    }

    let anchor = shift_secs(now, -gap_secs)?;
    series
        .samples()
        .iter()
        .map(|sample| {
            let back = last_ts.checked_sub(sample.timestamp).ok_or_else(|| {
                ReplayError::WindowExceedsSeries(format!(
                    "{}: span from {} to {} overflows",
                    series.host_id(),
                    sample.timestamp,
                    last_ts
                ))
            })?;
            Ok(TimedSample::new(shift_secs(anchor, -back)?, *sample))
        })
        .collect()
}

impl ReplayEngine {
    /// Loads every file concurrently and writes each as one batch.
    ///
    /// All files are processed even when some fail; the error then lists every
    /// failed file.
    pub async fn fill(&self, args: FillArgs) -> Result<()> {
        if args.files.is_empty() {
            return Err(ReplayError::config("no input files"));
        }
        self.injector.ensure_known(&args.anomaly)?;

        let now = self.clock.now();
        let progress = self.progress_bar(args.files.len(), "filling");
        let args = Arc::new(args);

        let mut tasks = Vec::with_capacity(args.files.len());
        for path in args.files.iter().cloned() {
            let engine = self.clone();
            let args = Arc::clone(&args);
            let progress = progress.clone();
            let target = path.display().to_string();
            tasks.push((
                target,
                tokio::spawn(async move {
                    let result = engine.fill_file(&path, &args, now).await;
                    if let Err(e) = &result {
                        progress.println(format!("failed {}: {}", path.display(), e));
                    }
                    progress.inc(1);
                    result
                }),
            ));
        }

        let written = join_tasks(tasks).await;
        progress.finish_and_clear();
        let written = written?;
        info!(
            files = written.len(),
            points = written.iter().sum::<usize>(),
            "fill complete"
        );
        Ok(())
    }

    async fn fill_file(&self, path: &Path, args: &FillArgs, now: DateTime<Utc>) -> Result<usize> {
        let host_id = host_id_from_path(path);
        let series = self.prepare(
            path,
            &host_id,
            args.start_at,
            args.duration,
            &args.anomaly,
            args.anomaly_window,
        )?;
        let points = anchor_to_last(&series, now, args.gap)?;
        self.store.write_batch(&host_id, &points).await?;

        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            info!(
                host = %host_id,
                points = points.len(),
                first = %first.time,
                last = %last.time,
                "filled host"
            );
        }
        Ok(points.len())
    }
}
