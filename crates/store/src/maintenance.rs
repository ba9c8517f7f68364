//! Scheduling wrapper around the sweep: a tokio task that runs
//! [`TargetStore::sweep_at`](crate::TargetStore::sweep_at) with a fixed delay
//! between runs, on the blocking pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use ais_track_core::Tracked;

use crate::store::StoreInner;

/// Owned handle to a running maintenance task.
pub struct MaintenanceHandle {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Start sweeping `inner` every `interval`; the first sweep runs one
    /// interval after start.
    pub(crate) fn spawn<T>(inner: Arc<StoreInner<T>>, interval: Duration) -> Self
    where
        T: Tracked + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let task_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            run(inner, interval, task_shutdown).await;
        });
        Self { shutdown, handle }
    }

    /// Ask the task to finish and wait up to `timeout` for it.
    ///
    /// Returns `false` if the task was still running when the wait ran out;
    /// the task is then left to finish on its own.
    pub async fn stop(self, timeout: Duration) -> bool {
        // notify_one keeps a permit if the task is busy sweeping right now.
        self.shutdown.notify_one();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Target store expiry task failed");
                true
            }
            Err(_) => false,
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run<T>(inner: Arc<StoreInner<T>>, interval: Duration, shutdown: Arc<Notify>)
where
    T: Tracked + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    debug!(interval = ?interval, "Target store expiry task started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => break,
        }
        if inner.is_closing() {
            break;
        }

        let started = Instant::now();
        let sweep_inner = inner.clone();
        let result = tokio::task::spawn_blocking(move || sweep_inner.sweep_at(Utc::now())).await;

        // A failed sweep never ends the schedule.
        match result {
            Ok(Ok(report)) => {
                info!(
                    removed = report.removed,
                    aborted = report.aborted,
                    compacted = report.compaction.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Stale data cleaned up"
                );
            }
            Ok(Err(e)) => {
                error!(error = %e, "Error cleaning up stale data");
            }
            Err(e) => {
                error!(error = %e, "Stale data cleanup panicked");
            }
        }
    }
    debug!("Target store expiry task stopped");
}
