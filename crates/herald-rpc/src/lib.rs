//! Herald RPC - Ledger client over Ethereum JSON-RPC
//!
//! This crate implements the ledger contract for a message-board contract
//! exposing `getMessage()` and `setMessage(string)`:
//! - ABI codec for a single dynamic string
//! - JSON-RPC transport over HTTP
//! - Transaction handles polling for acceptance and receipts
//!
//! Signing is delegated to the node: writes go through
//! `eth_sendTransaction` from an account the endpoint controls.

pub mod abi;
pub mod client;
pub mod error;

pub use abi::*;
pub use client::*;
pub use error::*;
