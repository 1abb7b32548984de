//! Herald Transaction Tracker - write lifecycle to finality
//!
//! This crate owns the one-at-a-time write path:
//! - Submission guard (single in-flight transaction)
//! - Driver task: sign, broadcast, await finality with a deadline
//! - Sequential application of driver progress to the state machine
//! - Snapshot publication on every transition

pub mod driver;
pub mod tracker;

pub use driver::*;
pub use tracker::*;
