//! Herald Runtime - Sync controller orchestration
//!
//! This crate composes reader and tracker into the sync controller:
//! 1. Accept a draft and guard against empty or unchanged submits
//! 2. Drive the write through the transaction tracker
//! 3. Relay every transition into the composite sync state
//! 4. Force a refresh on confirmation, clear the draft on the newer value
//! 5. Publish snapshots to subscribers
//!
//! It also carries the startup configuration file and logging setup.

pub mod config;
pub mod controller;
pub mod logging;

pub use config::*;
pub use controller::*;
pub use logging::*;
