//! Detection algorithms run as external programs with a CSV-in/CSV-out contract.

use super::records::{parse_detection_csv, AnomalyDetectionRecord};
use crate::config::DetectionConfig;
use crate::error::{ReplayError, Result};
use crate::metrics::MetricSeries;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// A detection algorithm over one host's series.
#[async_trait]
pub trait Detector: Send + Sync + 'static {
    /// Description attached to every event the algorithm produces.
    fn comment(&self) -> &str;

    async fn detect(&self, series: &MetricSeries) -> Result<Vec<AnomalyDetectionRecord>>;
}

/// Runs `program args… <input.csv> <output.csv>`; a non-zero exit is a failure.
#[derive(Debug, Clone)]
pub struct ExternalDetector {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    comment: String,
}

impl ExternalDetector {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        work_dir: impl Into<PathBuf>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            comment: comment.into(),
        }
    }

    pub fn isolation_forest(config: &DetectionConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.work_dir.clone(),
            "Isolation forest",
        )
    }
}

#[async_trait]
impl Detector for ExternalDetector {
    fn comment(&self) -> &str {
        &self.comment
    }

    async fn detect(&self, series: &MetricSeries) -> Result<Vec<AnomalyDetectionRecord>> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let input = self.work_dir.join(format!("{}_input.csv", series.host_id()));
        let output = self.work_dir.join(format!("{}_output.csv", series.host_id()));
        series.write_csv(&input)?;
        if tokio::fs::try_exists(&output).await? {
            tokio::fs::remove_file(&output).await?;
        }

        debug!(program = %self.program, input = %input.display(), "running detector");
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .arg(&output)
            .output()
            .await
            .map_err(|e| ReplayError::Detection(format!("failed to start {}: {}", self.program, e)))?;

        if !result.status.success() {
            return Err(ReplayError::Detection(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        let file = std::fs::File::open(&output).map_err(|e| {
            ReplayError::Detection(format!("missing output {}: {}", output.display(), e))
        })?;
        let records = parse_detection_csv(file)?;
        if records.is_empty() {
            return Err(ReplayError::Detection(format!(
                "{} produced no rows",
                output.display()
            )));
        }
        info!(host = %series.host_id(), rows = records.len(), "detector finished");
        Ok(records)
    }
}

/// Algorithm name to detector lookup table.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: HashMap<String, Arc<dyn Detector>>,
}

impl DetectorRegistry {
    /// Registry with the supported algorithms: `IF` (isolation forest).
    pub fn with_defaults(config: &DetectionConfig) -> Self {
        let mut registry = Self::default();
        registry.register("IF", Arc::new(ExternalDetector::isolation_forest(config)));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, detector: Arc<dyn Detector>) {
        self.detectors.insert(name.into(), detector);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Detector>> {
        self.detectors
            .get(name)
            .cloned()
            .ok_or_else(|| ReplayError::UnknownAlgorithm(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.detectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
