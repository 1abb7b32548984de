//! Transaction tracker - owns the single in-flight write

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use herald_core::{
    ErrorClassifier, InvalidTransition, LedgerClient, SyncError, Transaction, TxEvent, TxId,
    TxStatus,
};

use crate::{drive, ProgressSender, TxProgress, TxStep};

/// Tracker configuration
#[derive(Clone, Debug)]
pub struct TxConfig {
    /// How long `Confirming` may last before the write fails with `Timeout`
    pub confirm_deadline: Duration,
}

impl Default for TxConfig {
    fn default() -> Self {
        TxConfig {
            confirm_deadline: Duration::from_secs(120),
        }
    }
}

/// Lifecycle owner for one-at-a-time writes.
///
/// The ledger calls run in a spawned driver; their results come back as
/// [`TxProgress`] on the channel given at construction and only change the
/// transaction once the owner feeds them to [`TransactionTracker::apply`].
/// That keeps every transition on the owner's thread of control.
pub struct TransactionTracker<L: LedgerClient> {
    ledger: Arc<L>,
    config: TxConfig,
    classifier: ErrorClassifier,
    current: Option<Transaction>,
    last_id: TxId,
    progress: ProgressSender,
    driver: Option<JoinHandle<()>>,
    snapshots: watch::Sender<Option<Transaction>>,
}

impl<L: LedgerClient> TransactionTracker<L> {
    pub fn new(ledger: Arc<L>, config: TxConfig, progress: ProgressSender) -> Self {
        Self::with_classifier(ledger, config, ErrorClassifier::new(), progress)
    }

    pub fn with_classifier(
        ledger: Arc<L>,
        config: TxConfig,
        classifier: ErrorClassifier,
        progress: ProgressSender,
    ) -> Self {
        let (snapshots, _) = watch::channel(None);
        TransactionTracker {
            ledger,
            config,
            classifier,
            current: None,
            last_id: TxId::ZERO,
            progress,
            driver: None,
            snapshots,
        }
    }

    pub fn status(&self) -> TxStatus {
        self.current
            .as_ref()
            .map_or(TxStatus::Idle, |tx| tx.status)
    }

    pub fn current(&self) -> Option<&Transaction> {
        self.current.as_ref()
    }

    /// Receive a snapshot after every transition (`None` once reset)
    pub fn subscribe(&self) -> watch::Receiver<Option<Transaction>> {
        self.snapshots.subscribe()
    }

    /// Start a write. Rejected unless the tracker is `Idle`.
    pub fn submit(&mut self, payload: impl Into<String>) -> Result<Transaction, SyncError> {
        if let Some(tx) = &self.current {
            tracing::debug!(tx = %tx.id, status = ?tx.status, "rejecting conflicting submit");
            return Err(SyncError::ConflictingTransaction(tx.id));
        }

        let id = self.last_id.next();
        self.last_id = id;

        let mut tx = Transaction::new(id, payload);
        let status = tx.apply(TxEvent::Submit);
        debug_assert_eq!(status, Ok(TxStatus::AwaitingSignature));

        tracing::info!(tx = %id, "awaiting signature");
        self.driver = Some(tokio::spawn(drive(
            Arc::clone(&self.ledger),
            id,
            tx.payload.clone(),
            self.config.confirm_deadline,
            self.progress.clone(),
        )));

        self.current = Some(tx.clone());
        self.snapshots.send_replace(Some(tx.clone()));
        Ok(tx)
    }

    /// Apply a driver report. Returns the new snapshot if a transition happened.
    ///
    /// Reports for another attempt, or arriving after the attempt became
    /// terminal, are ignored.
    pub fn apply(&mut self, progress: TxProgress) -> Option<Transaction> {
        let Some(tx) = self.current.as_mut() else {
            tracing::warn!(tx = %progress.id, "ignoring progress with no active transaction");
            return None;
        };

        if tx.id != progress.id {
            tracing::warn!(tx = %progress.id, active = %tx.id, "ignoring progress for stale attempt");
            return None;
        }

        if tx.status.is_terminal() {
            tracing::warn!(tx = %tx.id, status = ?tx.status, "ignoring completion for finished transaction");
            return None;
        }

        let event = match progress.step {
            TxStep::Signed(handle) => TxEvent::Signed(handle),
            TxStep::Accepted => TxEvent::Accepted,
            TxStep::Finalized(receipt) => TxEvent::Finalized(receipt),
            TxStep::Failed(raw) => TxEvent::Failed(self.classifier.classify(&raw)),
            TxStep::DeadlineElapsed(deadline) => TxEvent::DeadlineElapsed(deadline),
        };

        match tx.apply(event) {
            Ok(status) => {
                match (status, &tx.error) {
                    (TxStatus::Failed(_), Some(err)) => {
                        tracing::warn!(tx = %tx.id, "transaction failed: {}", err)
                    }
                    _ => tracing::info!(tx = %tx.id, ?status, "transaction advanced"),
                }
                if status.is_terminal() {
                    self.driver = None;
                }
                let snapshot = tx.clone();
                self.snapshots.send_replace(Some(snapshot.clone()));
                Some(snapshot)
            }
            Err(err) => {
                tracing::warn!(tx = %tx.id, "ignoring out-of-order progress: {}", err);
                None
            }
        }
    }

    /// Return a terminal transaction to `Idle`.
    ///
    /// Never implicit: a terminal error stays visible until acknowledged.
    pub fn reset(&mut self) -> Result<(), InvalidTransition> {
        if let Some(tx) = self.current.as_mut() {
            tx.apply(TxEvent::Reset)?;
            tracing::debug!(tx = %tx.id, "tracker reset");
        }
        self.current = None;
        self.snapshots.send_replace(None);
        Ok(())
    }

    /// Cancel the in-flight driver, if any. Its pending reports never arrive.
    pub fn abort(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl<L: LedgerClient> Drop for TransactionTracker<L> {
    fn drop(&mut self) {
        self.abort();
    }
}
