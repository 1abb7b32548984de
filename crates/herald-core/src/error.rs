//! Error types for Herald

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::{TxId, TxStatus};

/// Closed error taxonomy surfaced to the presentation layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Signer declined the signature request
    UserRejected,
    /// Connectivity or transport timeout; retryable
    NetworkError,
    /// Ledger-side revert or execution failure
    ContractReverted,
    /// No confirmation within the configured deadline
    Timeout,
    /// A submit raced an in-flight transaction
    ConflictingTransaction,
    /// Draft was empty or equal to the current value
    EmptyOrUnchanged,
    /// Anything unmatched
    Unknown,
}

impl ErrorKind {
    /// Only network failures may be retried without user action
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::NetworkError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UserRejected => "user rejected",
            ErrorKind::NetworkError => "network error",
            ErrorKind::ContractReverted => "contract reverted",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConflictingTransaction => "conflicting transaction",
            ErrorKind::EmptyOrUnchanged => "empty or unchanged",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure mapped into the taxonomy, with a short display message
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ClassifiedError {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Unclassified failure reported by a ledger client or signer
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum RawError {
    /// Connection, DNS, reset or request timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the endpoint
    #[error("http status {status}: {message}")]
    Http { status: u16, message: String },

    /// JSON-RPC (or EIP-1193 provider) error object
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// Execution reverted on the ledger
    #[error("{message}")]
    Reverted {
        reason: Option<String>,
        message: String,
    },

    /// Confirmation deadline elapsed
    #[error("no confirmation within {0:?}")]
    Deadline(Duration),

    #[error("{0}")]
    Other(String),
}

impl RawError {
    pub fn other(message: impl Into<String>) -> Self {
        RawError::Other(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        RawError::Transport(message.into())
    }
}

/// Synchronous rejection of a submit
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum SyncError {
    #[error("transaction {0} is still in flight")]
    ConflictingTransaction(TxId),

    #[error("draft is empty or unchanged")]
    EmptyOrUnchanged,

    #[error("sync controller has shut down")]
    Shutdown,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::ConflictingTransaction(_) => ErrorKind::ConflictingTransaction,
            SyncError::EmptyOrUnchanged => ErrorKind::EmptyOrUnchanged,
            SyncError::Shutdown => ErrorKind::Unknown,
        }
    }
}

impl From<SyncError> for ClassifiedError {
    fn from(err: SyncError) -> Self {
        ClassifiedError::new(err.kind(), err.to_string())
    }
}

/// Event not allowed from the current transaction status
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("invalid transition: {event} from {from:?}")]
pub struct InvalidTransition {
    pub from: TxStatus,
    pub event: &'static str,
}

/// Result type for Herald operations
pub type HeraldResult<T> = Result<T, SyncError>;
