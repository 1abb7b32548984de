//! Ledger client contract
//!
//! Herald never talks to a ledger directly. A [`LedgerClient`] provides the
//! read and write primitives; the wallet or signer lives behind `write`.

use std::future::Future;

use crate::{RawError, Receipt};

/// Access to the remote ledger holding the shared value.
pub trait LedgerClient: Send + Sync + 'static {
    /// Handle returned once a write has been signed.
    type Handle: TransactionHandle;

    /// Read the current value.
    fn read(&self) -> impl Future<Output = Result<String, RawError>> + Send;

    /// Sign and hand a write to the ledger.
    ///
    /// May suspend while the signer asks the user for approval.
    fn write(&self, payload: &str) -> impl Future<Output = Result<Self::Handle, RawError>> + Send;
}

/// A signed write on its way to finality.
pub trait TransactionHandle: Send + 'static {
    /// Opaque ledger identifier (e.g. transaction hash).
    fn id(&self) -> String;

    /// Resolve once the ledger has acknowledged receipt of the transaction.
    fn accepted(&mut self) -> impl Future<Output = Result<(), RawError>> + Send;

    /// Resolve once the transaction is final.
    fn wait(self) -> impl Future<Output = Result<Receipt, RawError>> + Send;
}
