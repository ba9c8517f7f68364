pub mod db;
pub mod error;
pub mod journal;
pub mod maintenance;
pub mod snapshot;
pub mod store;
pub mod sweep;

// Re-export key types
pub use db::{CompactionStats, TargetDb};
pub use error::StoreError;
pub use store::TargetStore;
pub use sweep::SweepReport;
