use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    cli::commands::{CleanCommand, DetectCommand, FillCommand, StreamCommand},
    config::{LoggingConfig, Settings},
    detection::{DetectionService, DetectorRegistry},
    engine::{ReplayEngine, SystemClock},
    metrics::validate_file,
    storage::{MetricStore, StoreBackendType},
};

/// Installs console logging plus an optional log file.
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// must be held until exit so buffered file output is flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = if config.file.is_empty() {
        (None, None)
    } else {
        let path = Path::new(&config.file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .with_context(|| format!("Invalid log file path: {}", config.file))?;
        let file_appender = RollingFileAppender::new(Rotation::NEVER, dir, name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn MetricStore>> {
    let store = StoreBackendType::from_config(&settings.store)
        .with_context(|| format!("Failed to create {} store", settings.store.engine))?
        .into_shared();
    store.init().await.context("Failed to initialize store")?;
    Ok(store)
}

async fn build_engine(settings: &Settings) -> Result<ReplayEngine> {
    let store = open_store(settings).await?;
    Ok(ReplayEngine::new(store).with_progress(std::io::stderr().is_terminal()))
}

pub async fn handle_fill(settings: Settings, cmd: FillCommand) -> Result<()> {
    for file in &cmd.files {
        validate_file(file).with_context(|| format!("Invalid input {}", file.display()))?;
    }
    let engine = build_engine(&settings).await?;
    engine.injector().ensure_known(&cmd.anomaly.anomaly)?;

    info!(files = cmd.files.len(), "starting fill");
    engine.fill(cmd.to_args()).await.context("Fill failed")
}

pub async fn handle_stream(settings: Settings, cmd: StreamCommand) -> Result<()> {
    validate_file(&cmd.file).with_context(|| format!("Invalid input {}", cmd.file.display()))?;
    let engine = build_engine(&settings).await?;
    engine.injector().ensure_known(&cmd.anomaly.anomaly)?;

    engine.stream(cmd.to_args()).await.context("Stream failed")
}

pub async fn handle_clean(settings: Settings, cmd: CleanCommand) -> Result<()> {
    let engine = build_engine(&settings).await?;
    engine
        .clean(cmd.to_args(&settings.store.measurement))
        .await
        .context("Clean failed")
}

pub async fn handle_detect(settings: Settings, cmd: DetectCommand) -> Result<()> {
    let store = open_store(&settings).await?;
    let service = DetectionService::new(
        store,
        DetectorRegistry::with_defaults(&settings.detection),
        Arc::new(SystemClock),
        settings.detection.event_log.clone(),
    );
    let events = service
        .run(&cmd.host, &cmd.algorithm, cmd.duration)
        .await
        .with_context(|| format!("Detection for {} failed", cmd.host))?;

    for event in &events {
        println!("{},{},{},{}", event.timestamp, event.host, event.metric, event.comment);
    }
    info!(
        host = %cmd.host,
        events = events.len(),
        log = %settings.detection.event_log.display(),
        "detection complete"
    );
    Ok(())
}
