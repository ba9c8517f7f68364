use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use ais_track_core::config::StoreConfig;
use ais_track_core::{Mmsi, TrackError, Tracked};

use crate::db::{CompactionStats, TargetDb};
use crate::error::StoreError;
use crate::maintenance::MaintenanceHandle;
use crate::sweep::{self, SweepReport};

#[cfg(test)]
mod tests;

/// State shared between the store's callers and its maintenance task.
pub(crate) struct StoreInner<T> {
    map: RwLock<HashMap<Mmsi, T>>,
    db: TargetDb<T>,
    /// Set by `prepare_stop`: puts become no-ops.
    stopping: AtomicBool,
    /// Set by `close`: sweeps abort at the next entry.
    closing: AtomicBool,
    target_expire: chrono::Duration,
    compact_journal_bytes: u64,
}

impl<T> StoreInner<T>
where
    T: Tracked + Clone + Serialize + DeserializeOwned,
{
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Mmsi, T>> {
        self.map.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Mmsi, T>> {
        self.map.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn should_stop(&self) -> bool {
        self.stopping.load(Ordering::Acquire) || self.is_closing()
    }

    fn snapshot(&self) -> Vec<T> {
        self.read().values().cloned().collect()
    }

    /// Remove `mmsi` if it is still expired. The check is repeated under the
    /// write lock so a fresh put racing with the sweep survives.
    fn evict_if_expired(&self, mmsi: Mmsi, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut map = self.write();
        let expired = map
            .get(&mmsi)
            .is_some_and(|t| sweep::is_expired(t.last_report(), now, self.target_expire));
        if !expired {
            return Ok(false);
        }
        self.db.append_remove(mmsi)?;
        map.remove(&mmsi);
        Ok(true)
    }

    pub(crate) fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let candidates: Vec<(Mmsi, DateTime<Utc>)> = self
            .read()
            .values()
            .map(|t| (t.mmsi(), t.last_report()))
            .collect();

        let mut report = SweepReport::default();
        for (mmsi, last_report) in candidates {
            if self.should_stop() {
                report.aborted = true;
                debug!(
                    scanned = report.scanned,
                    removed = report.removed,
                    "Sweep aborted, store is stopping"
                );
                return Ok(report);
            }
            report.scanned += 1;
            if sweep::is_expired(last_report, now, self.target_expire)
                && self.evict_if_expired(mmsi, now)?
            {
                report.removed += 1;
            }
        }

        if report.removed > 0 {
            info!(removed = report.removed, "Targets removed");
        }

        let journal_bytes = self.db.journal_bytes();
        if !self.should_stop() && (report.removed > 0 || journal_bytes >= self.compact_journal_bytes) {
            report.compaction = Some(self.compact()?);
        }
        Ok(report)
    }

    fn compact(&self) -> Result<CompactionStats, StoreError> {
        self.db.compact(|| self.snapshot())
    }
}

/// Thread-safe map of the latest state per vessel, persisted to disk and
/// swept for stale entries in the background.
///
/// Lifecycle: [`open`](Self::open) → any number of `get`/`put`/`list` →
/// [`prepare_stop`](Self::prepare_stop) → [`close`](Self::close).
pub struct TargetStore<T> {
    inner: Arc<StoreInner<T>>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
    shutdown_timeout: Duration,
}

impl<T> TargetStore<T>
where
    T: Tracked + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Load the target database from `config.backup_dir` and start the
    /// expiry task. Must be called from within a tokio runtime.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| StoreError::Core(TrackError::Other(format!("no tokio runtime: {e}"))))?;

        let target_expire = chrono::Duration::from_std(config.target_expire).map_err(|e| {
            StoreError::Core(TrackError::Config {
                key: "TARGET_EXPIRE".to_string(),
                reason: e.to_string(),
            })
        })?;

        info!(backup_dir = %config.backup_dir.display(), "Loading target database");
        let (db, recovered) = TargetDb::open(&config.backup_dir, &config.db_name)?;
        if recovered.truncated_journals > 0 {
            warn!(
                journals = recovered.truncated_journals,
                "Recovered from torn journal writes"
            );
        }
        info!(targets = recovered.entries.len(), "Targets loaded");

        let inner = Arc::new(StoreInner {
            map: RwLock::new(recovered.entries),
            db,
            stopping: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            target_expire,
            compact_journal_bytes: config.compact_journal_bytes,
        });

        let maintenance = MaintenanceHandle::spawn(inner.clone(), config.cleanup_interval);

        Ok(Self {
            inner,
            maintenance: Mutex::new(Some(maintenance)),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Latest state of `mmsi`, if tracked.
    pub fn get(&self, mmsi: Mmsi) -> Option<T> {
        self.inner.read().get(&mmsi).cloned()
    }

    /// Insert or overwrite the entry for `target.mmsi()`.
    ///
    /// After [`prepare_stop`](Self::prepare_stop) this silently does nothing.
    /// On a journal error the in-memory entry is left unchanged.
    pub fn put(&self, target: T) -> Result<(), StoreError> {
        let mut map = self.inner.write();
        if self.inner.stopping.load(Ordering::Acquire) {
            trace!(mmsi = target.mmsi(), "Store stopping, put ignored");
            return Ok(());
        }
        self.inner.db.append_put(&target)?;
        map.insert(target.mmsi(), target);
        Ok(())
    }

    /// Number of tracked targets at the time of the call.
    pub fn size(&self) -> usize {
        self.inner.read().len()
    }

    /// Copy of every tracked target.
    pub fn list(&self) -> Vec<T> {
        self.inner.snapshot()
    }

    /// Copy of the tracked targets matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.inner
            .read()
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect()
    }

    /// Number of tracked targets matching `predicate`.
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        self.inner.read().values().filter(|t| predicate(t)).count()
    }

    /// Start the process of closing the store: every later `put` is ignored.
    pub fn prepare_stop(&self) {
        if !self.inner.stopping.swap(true, Ordering::AcqRel) {
            info!("Target store no longer accepting updates");
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    /// True once [`close`](Self::close) has closed the database.
    pub fn is_closed(&self) -> bool {
        self.inner.db.is_closed()
    }

    /// Run one expiry sweep as if the current time were `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        self.inner.sweep_at(now)
    }

    /// Compact the backing database immediately.
    pub fn compact(&self) -> Result<CompactionStats, StoreError> {
        self.inner.compact()
    }

    /// Stop the expiry task and close the database.
    ///
    /// Waits for an in-progress sweep for at most the configured shutdown
    /// timeout; after that the database is closed regardless. Call once.
    pub async fn close(&self) -> Result<(), StoreError> {
        info!("Stopping target store expiry task");
        self.inner.closing.store(true, Ordering::Release);

        let maintenance = self
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(maintenance) = maintenance {
            if !maintenance.stop(self.shutdown_timeout).await {
                warn!(
                    timeout = ?self.shutdown_timeout,
                    "Expiry task did not finish in time, closing database anyway"
                );
            }
        }

        info!("Closing database");
        self.inner.db.close()?;
        info!("Database closed");
        Ok(())
    }
}

impl<T> Drop for TargetStore<T> {
    fn drop(&mut self) {
        let maintenance = self
            .maintenance
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(maintenance) = maintenance {
            maintenance.abort();
        }
    }
}
