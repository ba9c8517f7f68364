use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// Interval of the "now tracking N targets" status line.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_DB_NAME: &str = "targetdb";
pub const DEFAULT_TARGET_EXPIRE: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_COMPACT_JOURNAL_MB: u64 = 64;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_duration(profile: &str, key: &str, default: Duration) -> Result<Duration, TrackError> {
    match profiled_env_opt(profile, key) {
        Some(raw) => parse_duration(&raw).map_err(|reason| TrackError::Config {
            key: key.to_string(),
            reason,
        }),
        None => Ok(default),
    }
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> Result<u64, TrackError> {
    match profiled_env_opt(profile, key) {
        Some(raw) => raw.trim().parse().map_err(|_| TrackError::Config {
            key: key.to_string(),
            reason: format!("expected an unsigned integer, got {raw:?}"),
        }),
        None => Ok(default),
    }
}

/// Parse `"90"`, `"45s"`, `"30m"`, `"12h"` or `"2d"` into a duration.
/// A bare number is read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration".to_string());
    }
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}"))?;
    let multiplier: u64 = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(format!("unknown duration unit {other:?} in {raw:?}")),
    };
    let secs = value
        .checked_mul(multiplier)
        .ok_or_else(|| "duration out of range".to_string())?;
    Ok(Duration::from_secs(secs))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub store: StoreConfig,
    pub tracker: TrackerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `AIS_TRACK_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, TrackError> {
        let profile = env_or("AIS_TRACK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, TrackError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            store: StoreConfig::from_env_profiled(p)?,
            tracker: TrackerConfig::from_env_profiled(p),
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  store:    backup_dir={}, db={}, expire={:?}, cleanup={:?}",
            self.store.backup_dir.display(),
            self.store.db_name,
            self.store.target_expire,
            self.store.cleanup_interval
        );
        tracing::info!(
            "  tracker:  filter={}",
            if self.tracker.input_filter.is_empty() { "(none)" } else { &self.tracker.input_filter }
        );
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the snapshot and journal files.
    pub backup_dir: PathBuf,
    /// Logical name of the target database inside `backup_dir`.
    pub db_name: String,
    /// Targets not reported for longer than this are evicted.
    pub target_expire: Duration,
    /// Delay between the end of one sweep and the start of the next.
    pub cleanup_interval: Duration,
    /// How long `close()` waits for an in-progress sweep.
    pub shutdown_timeout: Duration,
    /// Journal growth that forces a compaction even when nothing expired.
    pub compact_journal_bytes: u64,
}

impl StoreConfig {
    /// Defaults rooted at the given directory.
    pub fn with_backup_dir(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            db_name: DEFAULT_DB_NAME.to_string(),
            target_expire: DEFAULT_TARGET_EXPIRE,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            compact_journal_bytes: DEFAULT_COMPACT_JOURNAL_MB * 1_048_576,
        }
    }

    fn from_env_profiled(p: &str) -> Result<Self, TrackError> {
        Ok(Self {
            backup_dir: PathBuf::from(profiled_env_or(p, "BACKUP_DIR", "data/backup")),
            db_name: profiled_env_or(p, "TARGET_DB_NAME", DEFAULT_DB_NAME),
            target_expire: profiled_env_duration(p, "TARGET_EXPIRE", DEFAULT_TARGET_EXPIRE)?,
            cleanup_interval: profiled_env_duration(p, "CLEANUP_INTERVAL", DEFAULT_CLEANUP_INTERVAL)?,
            shutdown_timeout: profiled_env_duration(p, "STORE_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT)?,
            compact_journal_bytes: profiled_env_u64(p, "COMPACT_JOURNAL_MB", DEFAULT_COMPACT_JOURNAL_MB)?
                * 1_048_576,
        })
    }
}

// ── Tracker ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Filter expression applied to every incoming report (empty = accept all).
    pub input_filter: String,
    pub status_interval: Duration,
}

impl TrackerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            input_filter: profiled_env_or(p, "TRACKER_INPUT_FILTER", ""),
            status_interval: STATUS_INTERVAL,
        }
    }
}
