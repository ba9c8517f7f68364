//! Integration tests for the target store: durability across restarts,
//! background expiry, and shutdown.

mod durability;
mod helpers;
mod maintenance;
mod recovery;
mod shutdown;
