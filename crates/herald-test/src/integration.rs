//! End-to-end Sync Scenarios
//!
//! Drives the sync controller against the simulated ledger:
//! - Write round trips and confirm-then-refresh ordering
//! - Writes racing another writer
//! - Rejection, revert, timeout and network failures
//! - Monotonic application under overlapping reads
//! - Staleness and recovery
//! - Teardown

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use herald_core::{SyncState, TxStatus};
use herald_runtime::{Subscription, SyncController};

/// Upper bound for any scenario step in simulated time
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(600);

/// Every state published to a listener, in order
#[derive(Clone, Default)]
pub struct StateLog {
    states: Arc<Mutex<Vec<SyncState>>>,
}

impl StateLog {
    /// Record the controller's states until the subscription is dropped
    pub fn attach(controller: &SyncController) -> (Self, Subscription) {
        let log = StateLog::default();
        let sink = Arc::clone(&log.states);
        let subscription = controller.subscribe(move |state| sink.lock().push(state.clone()));
        (log, subscription)
    }

    pub fn states(&self) -> Vec<SyncState> {
        self.states.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transaction statuses seen, consecutive repeats collapsed
    pub fn statuses(&self) -> Vec<TxStatus> {
        let mut out: Vec<TxStatus> = Vec::new();
        for state in self.states.lock().iter() {
            let status = state.tx_status();
            if out.last() != Some(&status) {
                out.push(status);
            }
        }
        out
    }
}

/// Wait until the published state satisfies `pred`.
///
/// Returns `None` if the engine stopped or the scenario timeout elapsed.
pub async fn wait_for_state<F>(controller: &SyncController, pred: F) -> Option<SyncState>
where
    F: FnMut(&SyncState) -> bool,
{
    let mut rx = controller.watch();
    let result = tokio::time::timeout(SCENARIO_TIMEOUT, rx.wait_for(pred)).await;
    let state = match result {
        Ok(Ok(state)) => Some(state.clone()),
        _ => None,
    };
    state
}
