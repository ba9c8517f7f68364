//! Expiry rules applied by the periodic sweep.

use chrono::{DateTime, Duration, Utc};

use crate::db::CompactionStats;

/// Outcome of one sweep over the target map.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Entries examined before the sweep finished or was aborted.
    pub scanned: usize,
    pub removed: usize,
    /// The store started stopping mid-sweep; the pass is incomplete.
    pub aborted: bool,
    /// Set when the completed pass went on to compact the database.
    pub compaction: Option<CompactionStats>,
}

/// A target is expired once it has been silent for strictly longer than
/// `expire`. Timestamps in the future are never expired.
pub fn is_expired(last_report: DateTime<Utc>, now: DateTime<Utc>, expire: Duration) -> bool {
    now.signed_duration_since(last_report) > expire
}
