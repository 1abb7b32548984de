//! Herald Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every Herald component:
//! - Identifiers (TxId, Sequence)
//! - Sequenced ledger values
//! - Transactions and their lifecycle state machine
//! - The composite sync state
//! - The ledger client contract
//! - The error taxonomy and classifier

pub mod id;
pub mod value;
pub mod transaction;
pub mod state;
pub mod ledger;
pub mod error;
pub mod classify;

pub use id::*;
pub use value::*;
pub use transaction::*;
pub use state::*;
pub use ledger::*;
pub use error::*;
pub use classify::*;
