//! Transaction driver - performs the ledger calls of one write attempt

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use herald_core::{LedgerClient, RawError, Receipt, TransactionHandle, TxId};

/// Outcome of one ledger step of a write attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStep {
    Signed(String),
    Accepted,
    Finalized(Receipt),
    Failed(RawError),
    DeadlineElapsed(Duration),
}

/// Driver report, tagged with the attempt it belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxProgress {
    pub id: TxId,
    pub step: TxStep,
}

pub type ProgressSender = mpsc::UnboundedSender<TxProgress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<TxProgress>;

/// Channel carrying driver reports back to the tracker's owner
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Drive a write from signature request to finality.
///
/// Stops at the first failure. Stops silently if the receiving side is gone.
pub async fn drive<L: LedgerClient>(
    ledger: Arc<L>,
    id: TxId,
    payload: String,
    confirm_deadline: Duration,
    progress: ProgressSender,
) {
    let report = |step: TxStep| progress.send(TxProgress { id, step }).is_ok();

    let mut handle = match ledger.write(&payload).await {
        Ok(handle) => handle,
        Err(raw) => {
            report(TxStep::Failed(raw));
            return;
        }
    };

    if !report(TxStep::Signed(handle.id())) {
        return;
    }

    if let Err(raw) = handle.accepted().await {
        report(TxStep::Failed(raw));
        return;
    }

    if !report(TxStep::Accepted) {
        return;
    }

    let step = match tokio::time::timeout(confirm_deadline, handle.wait()).await {
        Ok(Ok(receipt)) => TxStep::Finalized(receipt),
        Ok(Err(raw)) => TxStep::Failed(raw),
        Err(_) => TxStep::DeadlineElapsed(confirm_deadline),
    };
    report(step);
}
