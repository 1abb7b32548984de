//! Composite sync state observed by the presentation layer

use crate::{ClassifiedError, Transaction, TxStatus, Value};

/// Everything a view needs to render the shared value.
///
/// Only the sync controller writes this; everyone else gets snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Latest value read from the ledger
    pub latest: Value,
    /// Local edit awaiting confirmation
    pub draft: Option<String>,
    /// Write attempt in progress or awaiting acknowledgement
    pub active: Option<Transaction>,
    /// Last terminal submit failure
    pub last_error: Option<ClassifiedError>,
    /// Set while reads are failing; the displayed value may be out of date
    pub staleness: Option<ClassifiedError>,
}

impl SyncState {
    pub fn new() -> Self {
        SyncState::default()
    }

    pub fn is_stale(&self) -> bool {
        self.staleness.is_some()
    }

    /// Status of the active transaction, `Idle` when there is none
    pub fn tx_status(&self) -> TxStatus {
        self.active
            .as_ref()
            .map_or(TxStatus::Idle, |tx| tx.status)
    }

    /// True while a write is pending and a new submit would conflict
    pub fn is_busy(&self) -> bool {
        !self.tx_status().is_idle()
    }
}
