//! In-process [`ReportBus`]: providers are tokio tasks that push every report
//! to all registered consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ais_track_core::{AisReport, TrackError};

use crate::bus::{ReportBus, ReportConsumer};

type Consumers = Arc<RwLock<Vec<Arc<dyn ReportConsumer>>>>;

enum Provider {
    Channel(mpsc::Receiver<AisReport>),
    Lines {
        name: String,
        reader: Box<dyn AsyncRead + Send + Unpin>,
    },
}

#[derive(Default)]
struct State {
    started: bool,
    consumers_started: bool,
    cancelled: bool,
    pending: Vec<Provider>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
pub struct ChannelBus {
    consumers: Consumers,
    state: Mutex<State>,
    cancelled: Arc<AtomicBool>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider fed through the returned sender.
    pub fn sender(&self, capacity: usize) -> mpsc::Sender<AisReport> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.lock().pending.push(Provider::Channel(rx));
        tx
    }

    /// Add a provider reading one JSON-encoded [`AisReport`] per line.
    /// Lines that fail to parse are logged and skipped.
    pub fn add_reader<R>(&self, name: impl Into<String>, reader: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.lock().pending.push(Provider::Lines {
            name: name.into(),
            reader: Box::new(reader),
        });
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True once every started provider has run to completion.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.tasks.iter().all(JoinHandle::is_finished)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deliver `report` to every consumer in turn. The consumer list is copied
/// first so no lock is held while a consumer applies back-pressure.
async fn dispatch(consumers: &Consumers, cancelled: &AtomicBool, report: AisReport) {
    if cancelled.load(Ordering::Acquire) {
        return;
    }
    let consumers: Vec<Arc<dyn ReportConsumer>> = consumers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match consumers.split_last() {
        Some((last, rest)) => {
            for consumer in rest {
                consumer.accept(report.clone()).await;
            }
            last.accept(report).await;
        }
        None => debug!(mmsi = report.mmsi, "No consumer registered, report dropped"),
    }
}

async fn run_channel(
    mut rx: mpsc::Receiver<AisReport>,
    consumers: Consumers,
    cancelled: Arc<AtomicBool>,
) {
    while let Some(report) = rx.recv().await {
        dispatch(&consumers, &cancelled, report).await;
    }
    debug!("Channel provider finished");
}

async fn run_lines(
    name: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    consumers: Consumers,
    cancelled: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();
    let mut line_no: u64 = 0;
    let mut delivered: u64 = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                line_no += 1;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<AisReport>(line) {
                    Ok(report) => {
                        dispatch(&consumers, &cancelled, report).await;
                        delivered += 1;
                    }
                    Err(e) => {
                        warn!(provider = %name, line = line_no, error = %e, "Skipping unparseable report");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(provider = %name, error = %e, "Report provider read failed");
                break;
            }
        }
    }
    info!(provider = %name, lines = line_no, delivered, "Report provider finished");
}

#[async_trait]
impl ReportBus for ChannelBus {
    async fn register_consumer(&self, consumer: Arc<dyn ReportConsumer>) -> Result<(), TrackError> {
        if self.lock().cancelled {
            return Err(TrackError::Source("bus has been cancelled".to_string()));
        }
        self.consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(consumer);
        Ok(())
    }

    async fn start(&self) -> Result<(), TrackError> {
        let mut state = self.lock();
        if state.cancelled {
            return Err(TrackError::Source("bus has been cancelled".to_string()));
        }
        state.started = true;
        Ok(())
    }

    async fn start_consumers(&self) -> Result<(), TrackError> {
        let mut state = self.lock();
        if !state.started {
            return Err(TrackError::Source("bus not started".to_string()));
        }
        state.consumers_started = true;
        debug!(consumers = self.consumer_count(), "Bus consumers started");
        Ok(())
    }

    async fn start_providers(&self) -> Result<(), TrackError> {
        let mut state = self.lock();
        if !state.consumers_started {
            return Err(TrackError::Source("bus consumers not started".to_string()));
        }
        let pending = std::mem::take(&mut state.pending);
        if pending.is_empty() {
            warn!("Bus has no report providers");
        }
        for provider in pending {
            let consumers = self.consumers.clone();
            let cancelled = self.cancelled.clone();
            let handle = match provider {
                Provider::Channel(rx) => tokio::spawn(run_channel(rx, consumers, cancelled)),
                Provider::Lines { name, reader } => {
                    tokio::spawn(run_lines(name, reader, consumers, cancelled))
                }
            };
            state.tasks.push(handle);
        }
        info!(providers = state.tasks.len(), "Bus providers started");
        Ok(())
    }

    async fn cancel(&self) {
        let tasks = {
            let mut state = self.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.pending.clear();
            std::mem::take(&mut state.tasks)
        };
        self.cancelled.store(true, Ordering::Release);
        for task in &tasks {
            task.abort();
        }
        self.consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!(providers = tasks.len(), "Bus cancelled");
    }
}
