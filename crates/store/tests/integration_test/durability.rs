use std::fs;

use chrono::{Duration, TimeZone, Utc};

use ais_track_core::TargetInfo;
use ais_track_store::journal::{journal_path, JournalRecord, JournalWriter};
use ais_track_store::snapshot::snapshot_path;
use ais_track_store::TargetStore;

use crate::helpers::{make_target, quiet_config, test_backup_dir};

#[tokio::test]
async fn test_close_and_reopen_recovers_targets() {
    let dir = test_backup_dir();
    let config = quiet_config(dir.clone());
    let now = Utc::now();

    {
        let store = TargetStore::open(&config).unwrap();
        for mmsi in 1..=50 {
            store.put(make_target(mmsi, now)).unwrap();
        }
        store.put(make_target(7, now + Duration::seconds(30))).unwrap();
        store.prepare_stop();
        store.close().await.unwrap();
    }

    let store = TargetStore::<TargetInfo>::open(&config).unwrap();
    assert_eq!(store.size(), 50);
    let seven = store.get(7).unwrap();
    assert_eq!(seven.last_report, now + Duration::seconds(30));
    assert_eq!(seven.fields, make_target(7, now).fields);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_evicted_targets_stay_evicted_after_restart() {
    let dir = test_backup_dir();
    let config = quiet_config(dir.clone());
    let t0 = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();

    {
        let store = TargetStore::open(&config).unwrap();
        store.put(make_target(1, t0)).unwrap();
        store.put(make_target(2, t0 + Duration::hours(2))).unwrap();
        let report = store.sweep_at(t0 + Duration::hours(2)).unwrap();
        assert_eq!(report.removed, 1);
        assert!(report.compaction.is_some());
        store.put(make_target(3, t0 + Duration::hours(2))).unwrap();
        store.close().await.unwrap();
    }

    assert!(snapshot_path(&dir, &config.db_name).exists());

    let store = TargetStore::<TargetInfo>::open(&config).unwrap();
    assert!(store.get(1).is_none());
    assert!(store.get(2).is_some());
    assert!(store.get(3).is_some());
    assert_eq!(store.size(), 2);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_repeated_compaction_keeps_single_journal() {
    let dir = test_backup_dir();
    let config = quiet_config(dir.clone());
    let store = TargetStore::open(&config).unwrap();
    let now = Utc::now();

    for round in 0..3u32 {
        for mmsi in 0..10 {
            store.put(make_target(round * 100 + mmsi, now)).unwrap();
        }
        store.compact().unwrap();
    }

    let journals: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".journal"))
        .collect();
    assert_eq!(journals.len(), 1);

    store.close().await.unwrap();
    let store = TargetStore::<TargetInfo>::open(&config).unwrap();
    assert_eq!(store.size(), 30);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_torn_journal_tail_is_tolerated() {
    let dir = test_backup_dir();
    let config = quiet_config(dir.clone());
    let now = Utc::now();

    {
        let store = TargetStore::open(&config).unwrap();
        store.put(make_target(1, now)).unwrap();
        store.put(make_target(2, now)).unwrap();
        store.close().await.unwrap();
    }

    // The first session wrote generation 1; append half a record to it.
    let path = journal_path(&dir, &config.db_name, 1);
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&512u32.to_le_bytes());
    bytes.extend_from_slice(&[0x92, 0x01]);
    fs::write(&path, bytes).unwrap();

    let store = TargetStore::<TargetInfo>::open(&config).unwrap();
    assert_eq!(store.size(), 2);
    store.put(make_target(3, now)).unwrap();
    store.close().await.unwrap();

    let store = TargetStore::<TargetInfo>::open(&config).unwrap();
    assert_eq!(store.size(), 3);

    store.close().await.unwrap();
    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_corrupt_journal_record_fails_open() {
    let dir = test_backup_dir();
    let config = quiet_config(dir.clone());
    fs::create_dir_all(&dir).unwrap();

    {
        let mut writer = JournalWriter::open(&dir, &config.db_name, 1).unwrap();
        writer
            .append(&JournalRecord::Put("not a target".to_string()))
            .unwrap();
    }

    let result = TargetStore::<TargetInfo>::open(&config);
    assert!(result.is_err());

    fs::remove_dir_all(&dir).ok();
}
