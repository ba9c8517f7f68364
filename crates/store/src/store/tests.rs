use super::*;
use chrono::{Duration as ChronoDuration, TimeZone};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use ais_track_core::{PacketSource, SourceType, TargetInfo};

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("ais-store-test-{}", Uuid::new_v4()))
}

fn make_config(backup_dir: PathBuf) -> StoreConfig {
    let mut config = StoreConfig::with_backup_dir(backup_dir);
    config.target_expire = Duration::from_secs(60 * 60);
    // Keep the background sweep out of the way; tests drive sweeps directly.
    config.cleanup_interval = Duration::from_secs(24 * 60 * 60);
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap()
}

fn make_target(mmsi: Mmsi, last_report: DateTime<Utc>) -> TargetInfo {
    TargetInfo {
        mmsi,
        last_report,
        source: PacketSource::new("test", SourceType::Terrestrial),
        report_count: 1,
        fields: Default::default(),
    }
}

#[tokio::test]
async fn test_open_empty_store() {
    let dir = temp_dir();
    let store = TargetStore::<TargetInfo>::open(&make_config(dir.clone())).unwrap();
    assert_eq!(store.size(), 0);
    assert!(store.get(1).is_none());
    assert!(dir.is_dir());
    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_open_outside_runtime_fails() {
    let dir = temp_dir();
    let result = TargetStore::<TargetInfo>::open(&make_config(dir.clone()));
    assert!(result.is_err());
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_last_write_wins() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();

    for minutes in 0..5 {
        store
            .put(make_target(219001000, t0() + ChronoDuration::minutes(minutes)))
            .unwrap();
    }

    assert_eq!(store.size(), 1);
    let latest = store.get(219001000).unwrap();
    assert_eq!(latest.last_report, t0() + ChronoDuration::minutes(4));

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_size_counts_distinct_ids() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();

    for mmsi in 1..=25 {
        store.put(make_target(mmsi, t0())).unwrap();
    }
    assert_eq!(store.size(), 25);
    assert_eq!(store.list().len(), 25);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_sweep_removes_all_expired() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    for mmsi in [1, 2, 3] {
        store.put(make_target(mmsi, t0())).unwrap();
    }

    let now = t0() + ChronoDuration::hours(1) + ChronoDuration::seconds(1);
    let report = store.sweep_at(now).unwrap();

    assert_eq!(report.removed, 3);
    assert!(!report.aborted);
    assert!(report.compaction.is_some());
    assert_eq!(store.size(), 0);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_sweep_keeps_fresh_targets() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    store.put(make_target(1, t0())).unwrap();

    let now = t0() + ChronoDuration::hours(1) - ChronoDuration::seconds(1);
    let report = store.sweep_at(now).unwrap();

    assert_eq!(report.removed, 0);
    assert!(report.compaction.is_none());
    assert!(store.get(1).is_some());

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_sweep_mixed_ages() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    let now = t0() + ChronoDuration::hours(3);

    store.put(make_target(1, t0())).unwrap();
    store.put(make_target(2, now - ChronoDuration::minutes(30))).unwrap();
    store.put(make_target(3, now + ChronoDuration::hours(5))).unwrap();

    let report = store.sweep_at(now).unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.removed, 1);
    assert!(store.get(1).is_none());
    assert!(store.get(2).is_some());
    // Future timestamps are left alone.
    assert!(store.get(3).is_some());

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_put_after_prepare_stop_is_ignored() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    store.put(make_target(1, t0())).unwrap();

    store.prepare_stop();
    assert!(store.is_stopping());

    store.put(make_target(1, t0() + ChronoDuration::hours(1))).unwrap();
    store.put(make_target(2, t0())).unwrap();

    assert_eq!(store.size(), 1);
    assert_eq!(store.get(1).unwrap().last_report, t0());
    assert!(store.get(2).is_none());

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_prepare_stop_is_idempotent() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    store.put(make_target(7, t0())).unwrap();

    store.prepare_stop();
    store.prepare_stop();
    store.put(make_target(8, t0())).unwrap();

    assert!(store.is_stopping());
    assert_eq!(store.size(), 1);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_sweep_aborts_when_stopping() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    for mmsi in 1..=10 {
        store.put(make_target(mmsi, t0())).unwrap();
    }
    store.prepare_stop();

    let report = store.sweep_at(t0() + ChronoDuration::days(1)).unwrap();
    assert!(report.aborted);
    assert_eq!(report.removed, 0);
    assert!(report.compaction.is_none());
    assert_eq!(store.size(), 10);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_put_after_close_is_an_error() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    store.close().await.unwrap();

    let result = store.put(make_target(1, t0()));
    assert!(matches!(result, Err(StoreError::Closed)));
    assert_eq!(store.size(), 0);

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_filter_and_count() {
    let dir = temp_dir();
    let store = TargetStore::open(&make_config(dir.clone())).unwrap();
    for mmsi in 1..=10 {
        store.put(make_target(mmsi, t0())).unwrap();
    }

    let even = store.filter(|t| t.mmsi % 2 == 0);
    assert_eq!(even.len(), 5);
    assert!(even.iter().all(|t| t.mmsi % 2 == 0));
    assert_eq!(store.count(|t| t.mmsi > 7), 3);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_journal_growth_forces_compaction() {
    let dir = temp_dir();
    let mut config = make_config(dir.clone());
    config.compact_journal_bytes = 1;
    let store = TargetStore::open(&config).unwrap();
    store.put(make_target(1, t0())).unwrap();

    let report = store.sweep_at(t0()).unwrap();
    assert_eq!(report.removed, 0);
    let stats = report.compaction.expect("journal threshold should trigger compaction");
    assert_eq!(stats.entries, 1);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}
