use std::fs;
use std::time::Duration;

use chrono::Utc;

use ais_track_store::TargetStore;

use crate::helpers::{make_config, make_target, test_backup_dir};

#[tokio::test]
async fn test_background_sweep_evicts_stale_targets() {
    let dir = test_backup_dir();
    let config = make_config(dir.clone(), Duration::from_millis(50));
    let store = TargetStore::open(&config).unwrap();
    let now = Utc::now();

    store.put(make_target(1, now - chrono::Duration::hours(2))).unwrap();
    store.put(make_target(2, now - chrono::Duration::hours(3))).unwrap();
    store.put(make_target(3, now)).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.size() > 1 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(store.size(), 1);
    assert!(store.get(3).is_some());

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_background_sweep_survives_many_runs() {
    let dir = test_backup_dir();
    let config = make_config(dir.clone(), Duration::from_millis(10));
    let store = TargetStore::open(&config).unwrap();
    let now = Utc::now();

    for mmsi in 1..=20 {
        store.put(make_target(mmsi, now)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Fresh targets are never touched by the scheduled sweeps.
    assert_eq!(store.size(), 20);

    store.close().await.unwrap();
    let reopened = TargetStore::<ais_track_core::TargetInfo>::open(&config).unwrap();
    assert_eq!(reopened.size(), 20);

    reopened.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_during_sweeps() {
    let dir = test_backup_dir();
    let config = make_config(dir.clone(), Duration::from_millis(5));
    let store = std::sync::Arc::new(TargetStore::open(&config).unwrap());

    let mut writers = Vec::new();
    for worker in 0..4u32 {
        let store = store.clone();
        writers.push(tokio::task::spawn_blocking(move || {
            for i in 0..250u32 {
                let mmsi = worker * 1000 + (i % 50);
                let last_report = if i % 2 == 0 {
                    Utc::now()
                } else {
                    Utc::now() - chrono::Duration::days(1)
                };
                store.put(make_target(mmsi, last_report)).unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    // The last write for an id lands on an iteration with the id's parity,
    // so the odd half of each worker's ids ends up stale.
    let report = store.sweep_at(Utc::now()).unwrap();
    assert!(!report.aborted);
    assert_eq!(store.size(), 100);
    assert!(store.list().iter().all(|t| t.mmsi % 2 == 0));

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}
