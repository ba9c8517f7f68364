use std::sync::Arc;

use tracing::trace;

use ais_track_core::{AisReport, TargetInfo};
use ais_track_store::{StoreError, TargetStore};

/// Folds one report into the current state of its vessel.
pub trait TargetMerger: Send + Sync {
    /// `current` is the stored state for `report.mmsi`, if any.
    fn merge(&self, current: Option<TargetInfo>, report: &AisReport) -> TargetInfo;
}

/// Newest report wins field by field.
///
/// A report older than the stored state still counts, but only fills in
/// fields the target does not have yet and never moves `last_report` back.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestReportMerger;

impl TargetMerger for LatestReportMerger {
    fn merge(&self, current: Option<TargetInfo>, report: &AisReport) -> TargetInfo {
        let Some(mut target) = current else {
            return TargetInfo::from_report(report);
        };
        target.report_count += 1;

        if report.received_at >= target.last_report {
            target.last_report = report.received_at;
            target.source = report.source.clone();
            target
                .fields
                .extend(report.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        } else {
            trace!(mmsi = report.mmsi, "Out-of-order report, filling gaps only");
            for (name, value) in &report.fields {
                target
                    .fields
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        target
    }
}

/// The update path from an accepted report to the store.
pub struct TargetTracker {
    store: Arc<TargetStore<TargetInfo>>,
    merger: Arc<dyn TargetMerger>,
}

impl TargetTracker {
    pub fn new(store: Arc<TargetStore<TargetInfo>>, merger: Arc<dyn TargetMerger>) -> Self {
        Self { store, merger }
    }

    /// Merge `report` into its target and write the result back.
    pub fn update(&self, report: &AisReport) -> Result<(), StoreError> {
        let current = self.store.get(report.mmsi);
        let next = self.merger.merge(current, report);
        self.store.put(next)
    }
}
