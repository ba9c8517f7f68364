use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::report::{AisReport, FieldValue, PacketSource};

/// Maritime Mobile Service Identity: the vessel key.
pub type Mmsi = u32;

/// Capability required of anything the target store retains.
///
/// The store keys entries by `mmsi()` and expires them by `last_report()`;
/// everything else about the value is opaque to it.
pub trait Tracked {
    fn mmsi(&self) -> Mmsi;
    fn last_report(&self) -> DateTime<Utc>;
}

/// Latest known state of one vessel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetInfo {
    pub mmsi: Mmsi,
    pub last_report: DateTime<Utc>,
    /// Source of the report that last updated this target.
    pub source: PacketSource,
    pub report_count: u64,
    pub fields: HashMap<String, FieldValue>,
}

impl TargetInfo {
    /// Start tracking a vessel from its first report.
    pub fn from_report(report: &AisReport) -> Self {
        Self {
            mmsi: report.mmsi,
            last_report: report.received_at,
            source: report.source.clone(),
            report_count: 1,
            fields: report.fields.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

impl Tracked for TargetInfo {
    fn mmsi(&self) -> Mmsi {
        self.mmsi
    }

    fn last_report(&self) -> DateTime<Utc> {
        self.last_report
    }
}
