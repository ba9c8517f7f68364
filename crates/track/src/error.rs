use thiserror::Error;

use ais_track_core::TrackError;
use ais_track_store::StoreError;

use crate::filter::FilterError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("AIS bus not configured")]
    BusNotConfigured,

    #[error("Track service already started")]
    AlreadyStarted,

    #[error("AIS bus error: {0}")]
    Bus(#[from] TrackError),

    #[error("Target store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid input filter: {0}")]
    Filter(#[from] FilterError),
}
