use std::fs;
use std::time::{Duration, Instant};

use chrono::Utc;

use ais_track_core::TargetInfo;
use ais_track_store::{StoreError, TargetStore};

use crate::helpers::{make_config, make_target, quiet_config, test_backup_dir};

async fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Compaction cannot open a new journal while the backup directory is
/// gone, so every sweep that evicts something fails. The schedule must keep
/// running and recover once the directory is back.
#[cfg(unix)]
#[tokio::test]
async fn test_failed_sweep_does_not_end_schedule() {
    let dir = test_backup_dir();
    let config = make_config(dir.clone(), Duration::from_millis(20));
    let store = TargetStore::open(&config).unwrap();
    let stale = Utc::now() - chrono::Duration::hours(2);

    fs::remove_dir_all(&dir).unwrap();
    assert!(store.compact().is_err());

    // First failing sweep.
    store.put(make_target(1, stale)).unwrap();
    wait_until(|| store.get(1).is_none()).await;
    assert!(store.get(1).is_none());

    // Scheduled again after the failure, and still failing.
    store.put(make_target(2, stale)).unwrap();
    wait_until(|| store.get(2).is_none()).await;
    assert!(store.get(2).is_none());
    assert!(!dir.join("targetdb.snapshot").exists());

    // Directory restored: the next sweep evicts and compacts again.
    fs::create_dir_all(&dir).unwrap();
    store.put(make_target(3, stale)).unwrap();
    wait_until(|| store.get(3).is_none() && dir.join("targetdb.snapshot").exists()).await;
    assert!(store.get(3).is_none());
    assert!(dir.join("targetdb.snapshot").exists());

    store.put(make_target(4, Utc::now())).unwrap();
    store.close().await.unwrap();

    let reopened = TargetStore::<TargetInfo>::open(&config).unwrap();
    assert_eq!(reopened.size(), 1);
    assert!(reopened.get(4).is_some());

    reopened.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_close_after_wait_timeout_still_closes_database() {
    let dir = test_backup_dir();
    let mut config = quiet_config(dir.clone());
    config.shutdown_timeout = Duration::ZERO;
    let store = TargetStore::open(&config).unwrap();
    store.put(make_target(5, Utc::now())).unwrap();

    let started = Instant::now();
    store.close().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(store.is_closed());
    assert!(matches!(
        store.put(make_target(6, Utc::now())),
        Err(StoreError::Closed)
    ));
    assert!(matches!(store.close().await, Err(StoreError::Closed)));

    let reopened = TargetStore::<TargetInfo>::open(&quiet_config(dir.clone())).unwrap();
    assert!(reopened.get(5).is_some());
    assert!(reopened.get(6).is_none());

    reopened.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}
