//! Ingestion coordinator: owns the bus subscription, the single ingestion
//! worker and the periodic status reporter, and exposes read-only queries
//! over the target store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use ais_track_core::config::{TrackerConfig, STATUS_INTERVAL};
use ais_track_core::{AisReport, Mmsi, PacketSource, TargetInfo, TrackError};
use ais_track_store::TargetStore;

use crate::bus::{ReportBus, ReportConsumer};
use crate::error::ServiceError;
use crate::fatal::{log_fatal, FatalError, FatalHook};
use crate::filter::ReportFilter;
use crate::merger::{LatestReportMerger, TargetMerger, TargetTracker};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

// ── Stats ────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    update_failures: AtomicU64,
}

/// Point-in-time view of the ingestion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub started_at: Option<DateTime<Utc>>,
    /// Reports delivered by the bus.
    pub received: u64,
    /// Reports that passed the input filter and were queued.
    pub accepted: u64,
    pub rejected: u64,
    /// Reports that arrived after the worker stopped.
    pub dropped: u64,
    /// Reports the worker wrote to the store.
    pub processed: u64,
    pub update_failures: u64,
}

// ── Consumer ─────────────────────────────────────────────────────────

/// Bus-side callback: filter, then hand off to the worker.
struct FilteringConsumer {
    filter: Arc<ReportFilter>,
    queue: mpsc::Sender<AisReport>,
    counters: Arc<Counters>,
}

#[async_trait]
impl ReportConsumer for FilteringConsumer {
    /// Waits for room in the queue, so a busy worker throttles the bus
    /// instead of losing accepted reports.
    async fn accept(&self, report: AisReport) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        if !self.filter.matches(&report) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            trace!(mmsi = report.mmsi, "Report rejected by input filter");
            return;
        }
        match self.queue.send(report).await {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::SendError(report)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(mmsi = report.mmsi, "Ingestion worker stopped, report dropped");
            }
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Fluent builder for a [`TrackService`].
pub struct TrackServiceBuilder {
    store: Arc<TargetStore<TargetInfo>>,
    bus: Option<Arc<dyn ReportBus>>,
    filter: ReportFilter,
    merger: Arc<dyn TargetMerger>,
    fatal_hook: FatalHook,
    status_interval: Duration,
    queue_capacity: usize,
}

impl TrackServiceBuilder {
    pub fn bus(mut self, bus: Arc<dyn ReportBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Filter applied to every report before it is queued (default: accept all).
    pub fn input_filter(mut self, filter: ReportFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Merge strategy (default: [`LatestReportMerger`]).
    pub fn merger(mut self, merger: Arc<dyn TargetMerger>) -> Self {
        self.merger = merger;
        self
    }

    /// Where fatal conditions are reported (default: [`log_fatal`]).
    pub fn fatal_hook(mut self, hook: FatalHook) -> Self {
        self.fatal_hook = hook;
        self
    }

    /// Interval of the status log (default: 5s).
    pub fn status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Capacity of the queue between the bus and the worker. A full queue
    /// holds back the bus until the worker catches up.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Apply the tracker section of the process config.
    pub fn tracker_config(mut self, config: &TrackerConfig) -> Result<Self, ServiceError> {
        self.filter = ReportFilter::parse(&config.input_filter)?;
        Ok(self.status_interval(config.status_interval))
    }

    pub fn build(self) -> TrackService {
        let tracker = Arc::new(TargetTracker::new(self.store.clone(), self.merger));
        TrackService {
            store: self.store,
            bus: self.bus,
            filter: Arc::new(self.filter),
            tracker,
            fatal_hook: self.fatal_hook,
            status_interval: self.status_interval,
            queue_capacity: self.queue_capacity,
            counters: Arc::new(Counters::default()),
            started: AtomicBool::new(false),
            started_at: Mutex::new(None),
            tasks: Mutex::new(None),
        }
    }
}

// ── TrackService ─────────────────────────────────────────────────────

struct Tasks {
    worker: JoinHandle<()>,
    status: JoinHandle<()>,
}

/// Subscribes to the report bus and keeps the target store up to date.
///
/// Lifecycle: [`start`](Self::start) once, then [`shutdown`](Self::shutdown)
/// (or [`stop`](Self::stop) when the store is closed elsewhere).
pub struct TrackService {
    store: Arc<TargetStore<TargetInfo>>,
    bus: Option<Arc<dyn ReportBus>>,
    filter: Arc<ReportFilter>,
    tracker: Arc<TargetTracker>,
    fatal_hook: FatalHook,
    status_interval: Duration,
    queue_capacity: usize,
    counters: Arc<Counters>,
    started: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
    tasks: Mutex<Option<Tasks>>,
}

impl TrackService {
    pub fn builder(store: Arc<TargetStore<TargetInfo>>) -> TrackServiceBuilder {
        TrackServiceBuilder {
            store,
            bus: None,
            filter: ReportFilter::new(),
            merger: Arc::new(LatestReportMerger),
            fatal_hook: log_fatal(),
            status_interval: STATUS_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Start the status reporter and the ingestion worker, then subscribe to
    /// the bus. Bus problems are reported through the fatal hook as well as
    /// returned.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let Some(bus) = self.bus.clone() else {
            error!("AIS bus not configured");
            (self.fatal_hook)(FatalError::BusNotConfigured);
            return Err(ServiceError::BusNotConfigured);
        };
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyStarted);
        }
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        info!(
            filter = !self.filter.is_empty(),
            queue_capacity = self.queue_capacity,
            "Starting AIS track service"
        );

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let status = tokio::spawn(status_loop(self.store.clone(), self.status_interval));
        let worker = tokio::spawn(ingest_loop(rx, self.tracker.clone(), self.counters.clone()));
        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = Some(Tasks { worker, status });

        let consumer = Arc::new(FilteringConsumer {
            filter: self.filter.clone(),
            queue: tx,
            counters: self.counters.clone(),
        });
        if let Err(e) = subscribe(bus.as_ref(), consumer).await {
            error!(error = %e, "Failed to start AIS bus");
            (self.fatal_hook)(FatalError::BusStart(e.to_string()));
            return Err(ServiceError::Bus(e));
        }

        info!("AIS track service started");
        Ok(())
    }

    /// Cancel the bus subscription, then stop the worker and the status
    /// reporter. Reports still queued are lost. Idempotent.
    pub async fn stop(&self) {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(tasks) = tasks else {
            return;
        };
        info!("Stopping AIS track service");
        if let Some(bus) = &self.bus {
            bus.cancel().await;
        }
        tasks.worker.abort();
        tasks.status.abort();
        info!("AIS track service stopped");
    }

    /// Stop ingestion, fence the store, then close it.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.stop().await;
        self.store.prepare_stop();
        self.store.close().await?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.worker.is_finished())
    }

    pub fn store(&self) -> &Arc<TargetStore<TargetInfo>> {
        &self.store
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn number_of_targets(&self) -> usize {
        self.store.size()
    }

    /// Number of targets whose last report came from a matching source.
    pub fn number_of_targets_from<S>(&self, source_filter: S) -> usize
    where
        S: Fn(&PacketSource) -> bool,
    {
        self.store.count(|t| source_filter(&t.source))
    }

    pub fn targets(&self) -> Vec<TargetInfo> {
        self.store.list()
    }

    pub fn targets_filtered<S, F>(&self, source_filter: S, target_filter: F) -> Vec<TargetInfo>
    where
        S: Fn(&PacketSource) -> bool,
        F: Fn(&TargetInfo) -> bool,
    {
        self.store
            .filter(|t| source_filter(&t.source) && target_filter(t))
    }

    pub fn target<S>(&self, mmsi: Mmsi, source_filter: S) -> Option<TargetInfo>
    where
        S: Fn(&PacketSource) -> bool,
    {
        self.store.get(mmsi).filter(|t| source_filter(&t.source))
    }

    pub fn stats(&self) -> ServiceStats {
        let c = &self.counters;
        ServiceStats {
            started_at: *self.started_at.lock().unwrap_or_else(PoisonError::into_inner),
            received: c.received.load(Ordering::Relaxed),
            accepted: c.accepted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            processed: c.processed.load(Ordering::Relaxed),
            update_failures: c.update_failures.load(Ordering::Relaxed),
        }
    }
}

async fn subscribe(bus: &dyn ReportBus, consumer: Arc<dyn ReportConsumer>) -> Result<(), TrackError> {
    bus.register_consumer(consumer).await?;
    bus.start().await?;
    bus.start_consumers().await?;
    bus.start_providers().await?;
    Ok(())
}

/// The only caller of `put` on behalf of the bus.
async fn ingest_loop(
    mut rx: mpsc::Receiver<AisReport>,
    tracker: Arc<TargetTracker>,
    counters: Arc<Counters>,
) {
    debug!("Ingestion worker started");
    while let Some(report) = rx.recv().await {
        match tracker.update(&report) {
            Ok(()) => {
                counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.update_failures.fetch_add(1, Ordering::Relaxed);
                warn!(mmsi = report.mmsi, error = %e, "Failed to update target");
            }
        }
    }
    debug!("Ingestion worker finished, bus closed");
}

async fn status_loop(store: Arc<TargetStore<TargetInfo>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the immediate first tick
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let targets = store.size();
        debug!(targets, "Now tracking {} targets", targets);
    }
}
