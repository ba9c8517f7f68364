use std::fs;
use std::time::{Duration, Instant};

use chrono::Utc;

use ais_track_core::TargetInfo;
use ais_track_store::{StoreError, TargetStore};

use crate::helpers::{make_config, make_target, quiet_config, test_backup_dir};

#[tokio::test]
async fn test_close_does_not_wait_for_next_sweep() {
    let dir = test_backup_dir();
    let config = quiet_config(dir.clone());
    let store = TargetStore::<TargetInfo>::open(&config).unwrap();

    let started = Instant::now();
    store.prepare_stop();
    store.close().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_second_close_reports_closed() {
    let dir = test_backup_dir();
    let store = TargetStore::<TargetInfo>::open(&quiet_config(dir.clone())).unwrap();

    store.close().await.unwrap();
    assert!(matches!(store.close().await, Err(StoreError::Closed)));

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_close_with_busy_schedule() {
    let dir = test_backup_dir();
    let config = make_config(dir.clone(), Duration::from_millis(1));
    let store = TargetStore::open(&config).unwrap();
    let stale = Utc::now() - chrono::Duration::days(2);
    for mmsi in 1..=500 {
        store.put(make_target(mmsi, stale)).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(3)).await;
    store.prepare_stop();
    store.close().await.unwrap();

    // Whatever the interrupted sweep removed was journaled before removal.
    let remaining = store.size();
    let reopened = TargetStore::<TargetInfo>::open(&quiet_config(dir.clone())).unwrap();
    assert_eq!(reopened.size(), remaining);

    reopened.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_drop_without_close_keeps_journaled_data() {
    let dir = test_backup_dir();
    let config = quiet_config(dir.clone());
    {
        let store = TargetStore::open(&config).unwrap();
        store.put(make_target(42, Utc::now())).unwrap();
    }

    let store = TargetStore::<TargetInfo>::open(&config).unwrap();
    assert!(store.get(42).is_some());

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}
