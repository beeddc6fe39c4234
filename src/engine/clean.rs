use super::{join_tasks, window_start, ReplayEngine};
use crate::error::{ReplayError, Result};
use crate::storage::DeleteRequest;
use std::time::Duration;
use tracing::info;

/// Parameters of a bulk delete.
#[derive(Debug, Clone, Default)]
pub struct CleanArgs {
    /// Delete every host in the measurement; `hosts` is ignored
    pub all: bool,
    pub hosts: Vec<String>,
    /// Trailing window to delete; `None` reaches back to the epoch
    pub duration: Option<Duration>,
    pub measurement: String,
}

impl ReplayEngine {
    /// Deletes the trailing window, once for all hosts or concurrently per host.
    pub async fn clean(&self, args: CleanArgs) -> Result<()> {
        if args.measurement.is_empty() {
            return Err(ReplayError::config("clean requires a measurement"));
        }
        let until = self.clock.now();
        let since = window_start(until, args.duration);

        if args.all {
            let request = DeleteRequest {
                measurement: args.measurement.clone(),
                host: None,
                since,
                until,
            };
            self.store.delete_range(&request).await?;
            info!(measurement = %args.measurement, %since, %until, "deleted all hosts");
            return Ok(());
        }

        if args.hosts.is_empty() {
            return Err(ReplayError::config("no hosts given; pass host names or --all"));
        }

        let progress = self.progress_bar(args.hosts.len(), "cleaning");
        let mut tasks = Vec::with_capacity(args.hosts.len());
        for host in args.hosts.iter().cloned() {
            let store = self.store.clone();
            let progress = progress.clone();
            let request = DeleteRequest {
                measurement: args.measurement.clone(),
                host: Some(host.clone()),
                since,
                until,
            };
            tasks.push((
                host.clone(),
                tokio::spawn(async move {
                    let result = store.delete_range(&request).await;
                    match &result {
                        Ok(()) => info!(host = %host, measurement = %request.measurement, "deleted host"),
                        Err(e) => progress.println(format!("failed {}: {}", host, e)),
                    }
                    progress.inc(1);
                    result
                }),
            ));
        }

        let result = join_tasks(tasks).await;
        progress.finish_and_clear();
        result.map(|_| ())
    }
}
