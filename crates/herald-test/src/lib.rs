//! Herald Test Harness - Simulated ledger and sync scenarios
//!
//! This crate provides:
//! - An in-memory ledger with scriptable faults and latencies
//! - End-to-end scenarios driving the sync controller against it

pub mod sim;
pub mod integration;

pub use sim::*;
pub use integration::*;
