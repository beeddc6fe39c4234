//! Anomaly detection runs over stored host metrics.
//!
//! A run pulls a host's recent samples from the store, hands them to a
//! registered detector, appends the flagged metrics to the event log and
//! records the raw flags in the anomaly measurement. Only one run may be in
//! flight per service.

pub mod external;
pub mod records;

pub use external::{Detector, DetectorRegistry, ExternalDetector};
pub use records::{
    append_events, parse_detection_csv, AnomalyDetectionRecord, AnomalyEvent, DETECTION_FLAGS,
};

use crate::engine::{window_start, Clock};
use crate::error::{ReplayError, Result};
use crate::storage::MetricStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Idle/running flag for detection runs.
#[derive(Debug, Default)]
pub struct DetectionGuard {
    running: AtomicBool,
}

/// Marks a run as in progress until dropped.
#[derive(Debug)]
pub struct DetectionPermit<'a> {
    guard: &'a DetectionGuard,
}

impl DetectionGuard {
    /// Moves `Idle -> Running`, failing if a run already holds the guard.
    pub fn try_acquire(&self) -> Result<DetectionPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| DetectionPermit { guard: self })
            .map_err(|_| ReplayError::DetectionInProgress)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for DetectionPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

pub struct DetectionService {
    store: Arc<dyn MetricStore>,
    detectors: DetectorRegistry,
    clock: Arc<dyn Clock>,
    event_log: PathBuf,
    guard: DetectionGuard,
}

impl DetectionService {
    pub fn new(
        store: Arc<dyn MetricStore>,
        detectors: DetectorRegistry,
        clock: Arc<dyn Clock>,
        event_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            detectors,
            clock,
            event_log: event_log.into(),
            guard: DetectionGuard::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Runs `algorithm` over the host's samples from the trailing `window`.
    pub async fn run(
        &self,
        host_id: &str,
        algorithm: &str,
        window: Duration,
    ) -> Result<Vec<AnomalyEvent>> {
        let detector = self.detectors.get(algorithm)?;
        let _permit = self.guard.try_acquire()?;

        let since = window_start(self.clock.now(), Some(window));
        let series = self.store.query_series(host_id, since).await?;
        info!(host = host_id, algorithm, samples = series.len(), "starting detection");

        let records = detector.detect(&series).await?;
        let events: Vec<AnomalyEvent> = records
            .iter()
            .flat_map(|r| r.flatten(host_id, detector.comment()))
            .collect();

        append_events(&self.event_log, &events)?;
        self.store.write_detections(host_id, &records).await?;
        info!(
            host = host_id,
            algorithm,
            records = records.len(),
            events = events.len(),
            "detection finished"
        );
        Ok(events)
    }
}
