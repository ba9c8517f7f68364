//! track-daemon — keeps the latest state of every vessel seen on the AIS
//! report stream and persists it across restarts.
//!
//! Reads newline-delimited JSON reports from a file or stdin, filters them,
//! and maintains the expiring target store until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use ais_track::{
    exit_on_fatal, install_panic_hook, ChannelBus, FatalError, ReportBus, TrackService,
};
use ais_track_core::config::{load_dotenv, Config};
use ais_track_core::TargetInfo;
use ais_track_store::TargetStore;

// ── CLI ─────────────────────────────────────────────────────────────

/// AIS track daemon: ingest reports and retain the latest target states.
#[derive(Parser, Debug)]
#[command(name = "track-daemon", version, about)]
struct Cli {
    /// NDJSON report file; stdin is read when omitted.
    #[arg(long, env = "TRACKER_INPUT")]
    input: Option<PathBuf>,

    /// Input filter expression, e.g. "sog > 2 & mmsi in (219001000)".
    /// Overrides TRACKER_INPUT_FILTER.
    #[arg(long)]
    filter: Option<String>,

    /// Directory for the target database. Overrides BACKUP_DIR.
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Reports buffered between the bus and the ingestion worker.
    #[arg(long, env = "TRACKER_QUEUE_CAPACITY", default_value_t = 10_000)]
    queue_capacity: usize,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let fatal = exit_on_fatal();
    install_panic_hook(fatal.clone());

    let mut config = Config::from_env()?;
    if let Some(filter) = cli.filter {
        config.tracker.input_filter = filter;
    }
    if let Some(dir) = cli.backup_dir {
        config.store.backup_dir = dir;
    }
    config.log_summary();

    let store: Arc<TargetStore<TargetInfo>> = match TargetStore::open(&config.store) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            fatal(FatalError::StoreInit(e.to_string()));
            return Err(e.into());
        }
    };

    let bus = Arc::new(ChannelBus::new());
    match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            bus.add_reader(path.display().to_string(), file);
        }
        None => bus.add_reader("stdin", tokio::io::stdin()),
    }

    let service = TrackService::builder(store)
        .bus(bus as Arc<dyn ReportBus>)
        .tracker_config(&config.tracker)?
        .queue_capacity(cli.queue_capacity)
        .fatal_hook(fatal)
        .build();

    service.start().await?;
    info!("track-daemon running");

    os_signal().await?;
    info!("Shutdown signal received");

    service.shutdown().await?;
    let stats = service.stats();
    info!(
        received = stats.received,
        accepted = stats.accepted,
        rejected = stats.rejected,
        dropped = stats.dropped,
        "track-daemon exited cleanly"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
