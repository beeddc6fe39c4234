//! Named synthetic faults applied to a series before it is persisted.
//!
//! The injector is a lookup table from anomaly name to transformation. Adding a
//! fault is registering one more entry; the replay engine only ever refers to
//! anomalies by name.

use crate::error::{ReplayError, Result};
use crate::metrics::{MetricSample, MetricSeries};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An in-place rewrite of one or more fields across a slice of samples.
pub type AnomalyFn = Arc<dyn Fn(&mut [MetricSample]) -> Result<()> + Send + Sync>;

/// Sub-range of a series an anomaly is confined to, relative to its offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnomalyWindow {
    pub start_at: Duration,
    pub duration: Duration,
}

/// Registry of named anomaly transformations.
#[derive(Clone)]
pub struct AnomalyInjector {
    anomalies: HashMap<String, AnomalyFn>,
}

impl fmt::Debug for AnomalyInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnomalyInjector")
            .field("anomalies", &self.names())
            .finish()
    }
}

impl Default for AnomalyInjector {
    fn default() -> Self {
        let mut injector = Self::empty();
        // Saturated CPU.
        injector.register("a1", |samples| {
            for sample in samples.iter_mut() {
                sample.cpu_user = 1.0;
            }
            Ok(())
        });
        // CPU oscillating with the recording clock.
        injector.register("a2", |samples| {
            for sample in samples.iter_mut() {
                sample.cpu_user = ((sample.timestamp / 10) as f64).sin().abs();
            }
            Ok(())
        });
        injector
    }
}

impl AnomalyInjector {
    /// Creates a registry with no anomalies.
    pub fn empty() -> Self {
        Self {
            anomalies: HashMap::new(),
        }
    }

    /// Adds or replaces a named transformation.
    pub fn register<F>(&mut self, name: impl Into<String>, transform: F)
    where
        F: Fn(&mut [MetricSample]) -> Result<()> + Send + Sync + 'static,
    {
        self.anomalies.insert(name.into(), Arc::new(transform));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.anomalies.contains_key(name)
    }

    /// Sorted anomaly names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.anomalies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fails with `UnknownAnomaly` unless `name` is empty or registered.
    pub fn ensure_known(&self, name: &str) -> Result<()> {
        if name.is_empty() || self.contains(name) {
            Ok(())
        } else {
            Err(ReplayError::UnknownAnomaly(name.to_string()))
        }
    }

    fn lookup(&self, name: &str) -> Result<Option<&AnomalyFn>> {
        if name.is_empty() {
            return Ok(None);
        }
        self.anomalies
            .get(name)
            .map(Some)
            .ok_or_else(|| ReplayError::UnknownAnomaly(name.to_string()))
    }

    /// Applies `name` across the whole series. An empty name is a no-op.
    pub fn inject(&self, series: &mut MetricSeries, name: &str) -> Result<()> {
        let Some(transform) = self.lookup(name)? else {
            return Ok(());
        };
        debug!(host = %series.host_id(), anomaly = name, "injecting anomaly");
        transform(series.samples_mut())
    }

    /// Applies `name` only to the samples selected by `window`.
    pub fn inject_window(
        &self,
        series: &mut MetricSeries,
        name: &str,
        window: AnomalyWindow,
    ) -> Result<()> {
        let Some(transform) = self.lookup(name)? else {
            return Ok(());
        };
        let range = series.window(window.start_at, window.duration)?;
        debug!(
            host = %series.host_id(),
            anomaly = name,
            from = range.start,
            to = range.end,
            "injecting windowed anomaly"
        );
        transform(&mut series.samples_mut()[range])
    }

    /// Injects across `window` when given, otherwise across the whole series.
    pub fn apply(
        &self,
        series: &mut MetricSeries,
        name: &str,
        window: Option<AnomalyWindow>,
    ) -> Result<()> {
        match window {
            Some(window) => self.inject_window(series, name, window),
            None => self.inject(series, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(timestamps: &[i64]) -> MetricSeries {
        let samples = timestamps
            .iter()
            .map(|&timestamp| MetricSample {
                timestamp,
                cpu_user: 0.25,
                ..Default::default()
            })
            .collect();
        MetricSeries::new("host", samples).unwrap()
    }

    fn cpu_user(series: &MetricSeries) -> Vec<f64> {
        series.samples().iter().map(|s| s.cpu_user).collect()
    }

    #[test]
    fn test_empty_name_is_noop() {
        let injector = AnomalyInjector::default();
        let mut s = series(&[0, 10, 20]);
        let before = s.clone();
        injector.inject(&mut s, "").unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn test_unknown_name_fails_without_mutation() {
        let injector = AnomalyInjector::default();
        let mut s = series(&[0, 10, 20]);
        let before = s.clone();
        let err = injector.inject(&mut s, "unknown-name").unwrap_err();
        assert!(matches!(err, ReplayError::UnknownAnomaly(ref n) if n == "unknown-name"));
        assert_eq!(s, before);
        assert!(injector.ensure_known("unknown-name").is_err());
        assert!(injector.ensure_known("").is_ok());
    }

    #[test]
    fn test_a1_saturates_cpu_user() {
        let injector = AnomalyInjector::default();
        let mut s = series(&[0, 10, 20]);
        injector.inject(&mut s, "a1").unwrap();
        assert_eq!(cpu_user(&s), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_a2_follows_sine_of_whole_tens() {
        let injector = AnomalyInjector::default();
        let mut s = series(&[0, 15, 29, 30]);
        injector.inject(&mut s, "a2").unwrap();
        let values = cpu_user(&s);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 1f64.sin().abs());
        assert_eq!(values[2], 2f64.sin().abs());
        assert_eq!(values[3], 3f64.sin().abs());
    }

    #[test]
    fn test_window_limits_injection() {
        let injector = AnomalyInjector::default();
        let mut s = series(&[0, 10, 20, 30, 40]);
        let window = AnomalyWindow {
            start_at: Duration::from_secs(10),
            duration: Duration::from_secs(20),
        };
        injector.inject_window(&mut s, "a1", window).unwrap();
        assert_eq!(cpu_user(&s), vec![0.25, 1.0, 1.0, 0.25, 0.25]);
    }

    #[test]
    fn test_registry_is_open_for_extension() {
        let mut injector = AnomalyInjector::default();
        injector.register("thermal", |samples| {
            for sample in samples.iter_mut() {
                sample.sys_thermal = 95.0;
            }
            Ok(())
        });
        assert_eq!(injector.names(), vec!["a1", "a2", "thermal"]);

        let mut s = series(&[0, 10]);
        injector.inject(&mut s, "thermal").unwrap();
        assert!(s.samples().iter().all(|x| x.sys_thermal == 95.0));
    }

    #[test]
    fn test_transformation_error_propagates() {
        let mut injector = AnomalyInjector::empty();
        injector.register("broken", |_| Err(ReplayError::config("broken anomaly")));
        let mut s = series(&[0]);
        assert!(matches!(
            injector.inject(&mut s, "broken"),
            Err(ReplayError::Configuration(_))
        ));
    }
}
