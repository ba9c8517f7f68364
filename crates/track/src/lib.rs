pub mod bus;
pub mod channel;
pub mod error;
pub mod fatal;
pub mod filter;
pub mod merger;
pub mod service;

// Re-export key types
pub use bus::{ReportBus, ReportConsumer};
pub use channel::ChannelBus;
pub use error::ServiceError;
pub use fatal::{exit_on_fatal, install_panic_hook, log_fatal, FatalError, FatalHook, FATAL_EXIT_CODE};
pub use filter::{FieldPredicate, FilterError, ReportFilter};
pub use merger::{LatestReportMerger, TargetMerger, TargetTracker};
pub use service::{ServiceStats, TrackService, TrackServiceBuilder};
