use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ais_track_core::config::StoreConfig;
use ais_track_core::{FieldValue, Mmsi, PacketSource, SourceType, TargetInfo};

/// Unique backup directory for each test (not created).
pub fn test_backup_dir() -> PathBuf {
    std::env::temp_dir().join(format!("ais-track-test-{}", Uuid::new_v4()))
}

/// Store configuration with a one hour expiry and the given sweep interval.
pub fn make_config(backup_dir: PathBuf, cleanup_interval: Duration) -> StoreConfig {
    let mut config = StoreConfig::with_backup_dir(backup_dir);
    config.target_expire = Duration::from_secs(60 * 60);
    config.cleanup_interval = cleanup_interval;
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Configuration whose background sweep never runs during a test.
pub fn quiet_config(backup_dir: PathBuf) -> StoreConfig {
    make_config(backup_dir, Duration::from_secs(24 * 60 * 60))
}

pub fn make_target(mmsi: Mmsi, last_report: DateTime<Utc>) -> TargetInfo {
    let mut fields = std::collections::HashMap::new();
    fields.insert("sog".to_string(), FieldValue::Float(11.5));
    fields.insert("name".to_string(), FieldValue::Text(format!("VESSEL {mmsi}")));
    TargetInfo {
        mmsi,
        last_report,
        source: PacketSource::new("AISD", SourceType::Terrestrial),
        report_count: 1,
        fields,
    }
}
