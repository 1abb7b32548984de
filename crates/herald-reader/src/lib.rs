//! Herald Reader - Periodic ledger polling
//!
//! This crate implements the polling side of the sync engine:
//! - Interval reads with exponential backoff on failure
//! - Deduplication of unchanged values
//! - Sequence assignment and discarding of overtaken reads
//! - Out-of-cycle refreshes and deterministic cancellation

pub mod backoff;
pub mod cursor;
pub mod poller;

pub use backoff::*;
pub use cursor::*;
pub use poller::*;
