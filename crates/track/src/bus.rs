use std::sync::Arc;

use async_trait::async_trait;

use ais_track_core::{AisReport, TrackError};

/// Push-based receiver of reports from a [`ReportBus`].
///
/// Awaited on the bus's delivery task: a consumer that is slow to accept
/// holds back the provider that delivered the report.
#[async_trait]
pub trait ReportConsumer: Send + Sync {
    async fn accept(&self, report: AisReport);
}

/// Upstream report distribution system.
///
/// Start-up happens in four steps: consumers are registered, the bus is
/// started, then its consumers and finally its providers are started.
/// Reports only flow once providers run.
#[async_trait]
pub trait ReportBus: Send + Sync {
    async fn register_consumer(&self, consumer: Arc<dyn ReportConsumer>) -> Result<(), TrackError>;

    async fn start(&self) -> Result<(), TrackError>;

    async fn start_consumers(&self) -> Result<(), TrackError>;

    async fn start_providers(&self) -> Result<(), TrackError>;

    /// Stop delivering reports and tear down every provider. Idempotent.
    async fn cancel(&self);
}

/// Blanket implementation so `Arc<dyn ReportBus>` can be used directly.
#[async_trait]
impl<T: ReportBus + ?Sized> ReportBus for Arc<T> {
    async fn register_consumer(&self, consumer: Arc<dyn ReportConsumer>) -> Result<(), TrackError> {
        (**self).register_consumer(consumer).await
    }

    async fn start(&self) -> Result<(), TrackError> {
        (**self).start().await
    }

    async fn start_consumers(&self) -> Result<(), TrackError> {
        (**self).start_consumers().await
    }

    async fn start_providers(&self) -> Result<(), TrackError> {
        (**self).start_providers().await
    }

    async fn cancel(&self) {
        (**self).cancel().await
    }
}
