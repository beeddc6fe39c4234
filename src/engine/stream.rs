use super::{shift_secs, ReplayEngine};
use crate::anomaly::AnomalyWindow;
use crate::error::{ReplayError, Result};
use crate::metrics::host_id_from_path;
use crate::storage::TimedSample;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Parameters of a paced single-file replay.
#[derive(Debug, Clone)]
pub struct StreamArgs {
    pub file: PathBuf,
    pub start_at: Duration,
    pub duration: Duration,
    /// Speed-up of the recorded inter-sample time; above 1 only when appending
    pub time_multiplier: u32,
    /// Continue after the host's last stored sample instead of starting now
    pub append: bool,
    pub anomaly: String,
    pub anomaly_window: Option<AnomalyWindow>,
}

impl Default for StreamArgs {
    fn default() -> Self {
        Self {
            file: PathBuf::new(),
            start_at: Duration::ZERO,
            duration: Duration::ZERO,
            time_multiplier: 1,
            append: false,
            anomaly: String::new(),
            anomaly_window: None,
        }
    }
}

impl StreamArgs {
    fn validate(&self) -> Result<()> {
        if self.time_multiplier == 0 {
            return Err(ReplayError::config("time multiplier must be at least 1"));
        }
        if !self.append && self.time_multiplier > 1 {
            return Err(ReplayError::config(format!(
                "time multiplier {} requires append mode; a fresh stream would insert future samples",
                self.time_multiplier
            )));
        }
        Ok(())
    }
}

/// Wall-clock sleep between two samples `delta_secs` apart.
pub fn pacing_interval(delta_secs: i64, time_multiplier: u32) -> Duration {
    Duration::from_secs(delta_secs.max(0) as u64) / time_multiplier.max(1)
}

impl ReplayEngine {
    /// Inserts samples one at a time, sleeping the recorded gap divided by the
    /// multiplier between insertions.
    ///
    /// Stops with `PacingExceeded` as soon as the next insertion time is ahead
    /// of the wall clock. The final sample is always written.
    pub async fn stream(&self, args: StreamArgs) -> Result<()> {
        args.validate()?;
        self.injector.ensure_known(&args.anomaly)?;

        let host_id = host_id_from_path(&args.file);
        let series = self.prepare(
            &args.file,
            &host_id,
            args.start_at,
            args.duration,
            &args.anomaly,
            args.anomaly_window,
        )?;

        let mut insert_at = if args.append {
            let delta = series.delta_after(0).ok_or_else(|| {
                ReplayError::config(format!(
                    "{}: append mode needs at least two samples to derive the sample interval",
                    host_id
                ))
            })?;
            let last = self
                .store
                .last_sample(&host_id)
                .await?
                .ok_or_else(|| ReplayError::NotFound(host_id.clone()))?;
            shift_secs(last.time, delta)?
        } else {
            self.clock.now()
        };

        info!(
            host = %host_id,
            samples = series.len(),
            start = %insert_at,
            multiplier = args.time_multiplier,
            append = args.append,
            "starting stream"
        );

        for (i, sample) in series.samples().iter().enumerate() {
            let next_delta = series.delta_after(i);
            if next_delta.is_some() {
                let now = self.clock.now();
                if insert_at > now {
                    return Err(ReplayError::PacingExceeded { insert_at, now });
                }
            }
            self.store
                .write_one(&host_id, &TimedSample::new(insert_at, *sample))
                .await?;
            info!(host = %host_id, time = %insert_at, offset = sample.timestamp, "inserted sample");

            if let Some(delta) = next_delta {
                insert_at = shift_secs(insert_at, delta)?;
                tokio::time::sleep(pacing_interval(delta, args.time_multiplier)).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_interval() {
        assert_eq!(pacing_interval(10, 1), Duration::from_secs(10));
        assert_eq!(pacing_interval(10, 4), Duration::from_millis(2_500));
        assert_eq!(pacing_interval(0, 2), Duration::ZERO);
    }

    #[test]
    fn test_validate() {
        let fresh_fast = StreamArgs {
            time_multiplier: 2,
            ..Default::default()
        };
        assert!(matches!(fresh_fast.validate(), Err(ReplayError::Configuration(_))));

        let append_fast = StreamArgs {
            time_multiplier: 2,
            append: true,
            ..Default::default()
        };
        assert!(append_fast.validate().is_ok());

        let zero = StreamArgs {
            time_multiplier: 0,
            append: true,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }
}
