//! Sync controller - the single writer of the composite sync state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use herald_core::{
    ClassifierConfig, ErrorClassifier, HeraldResult, LedgerClient, Sequence, SyncError, SyncState,
    TxId, TxStatus, Value,
};
use herald_reader::{PollConfig, PollingReader, ReaderEvent, ReaderEvents, ReaderHandle};
use herald_tx::{progress_channel, ProgressReceiver, TransactionTracker, TxConfig, TxProgress};

/// Sync controller configuration
#[derive(Clone, Debug, Default)]
pub struct SyncConfig {
    pub poll: PollConfig,
    pub tx: TxConfig,
    pub classifier: ClassifierConfig,
}

impl SyncConfig {
    /// Short intervals for local development ledgers
    pub fn fast() -> Self {
        SyncConfig {
            poll: PollConfig::fast(),
            tx: TxConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Callback receiving every published state
pub type Listener = Box<dyn FnMut(&SyncState) + Send>;

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<HeraldResult<TxId>>,
    },
    Subscribe {
        id: u64,
        listener: Listener,
    },
    Unsubscribe(u64),
    Refresh,
    Shutdown,
}

/// Handle to a running sync engine.
///
/// All state changes happen on the engine task, one message at a time.
/// Dropping the controller tears the engine down: the reader stops, the
/// in-flight driver is cancelled and late ledger responses are discarded.
pub struct SyncController {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SyncState>,
    next_listener: AtomicU64,
    task: Option<JoinHandle<()>>,
}

impl SyncController {
    /// Start polling and accept submits against `ledger`
    pub fn spawn<L: LedgerClient>(ledger: Arc<L>, config: SyncConfig) -> Self {
        let classifier = ErrorClassifier::with_config(config.classifier.clone());

        let reader =
            PollingReader::with_classifier(Arc::clone(&ledger), config.poll.clone(), classifier.clone());
        let (reader, events) = reader.start();

        let (progress_tx, progress_rx) = progress_channel();
        let tracker = TransactionTracker::with_classifier(ledger, config.tx, classifier, progress_tx);

        let (published, state) = watch::channel(SyncState::new());
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let engine = SyncEngine {
            state: SyncState::new(),
            tracker,
            reader,
            listeners: Vec::new(),
            published,
            pending: None,
        };

        let task = tokio::spawn(engine.run(commands_rx, progress_rx, events));

        SyncController {
            commands,
            state,
            next_listener: AtomicU64::new(1),
            task: Some(task),
        }
    }

    /// Submit a draft for writing.
    ///
    /// Resolves once the submit is accepted or rejected; confirmation is
    /// reported through the sync state.
    pub async fn submit(&self, text: impl Into<String>) -> HeraldResult<TxId> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                text: text.into(),
                reply,
            })
            .map_err(|_| SyncError::Shutdown)?;
        rx.await.map_err(|_| SyncError::Shutdown)?
    }

    /// Latest published state
    pub fn current_state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Async observer of published states
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Register a listener. It is called with the current state right away,
    /// then after every change, until the subscription is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&SyncState) + Send + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let _ = self.commands.send(Command::Subscribe {
            id,
            listener: Box::new(listener),
        });
        Subscription {
            id,
            commands: self.commands.clone(),
            attached: true,
        }
    }

    /// Force an out-of-cycle read
    pub fn refresh_now(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    /// Stop the engine and wait for it to finish
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!("sync engine ended abnormally: {}", err);
            }
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Listener registration; dropping it unsubscribes
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    attached: bool,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Keep the listener for the lifetime of the controller
    pub fn detach(mut self) {
        self.attached = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.attached {
            let _ = self.commands.send(Command::Unsubscribe(self.id));
        }
    }
}

/// Write awaiting its post-confirmation refresh
struct PendingWrite {
    id: TxId,
    payload: String,
    /// Latest sequence when the write was submitted
    base: Sequence,
    confirmed: bool,
}

struct SyncEngine<L: LedgerClient> {
    state: SyncState,
    tracker: TransactionTracker<L>,
    reader: ReaderHandle,
    listeners: Vec<(u64, Listener)>,
    published: watch::Sender<SyncState>,
    pending: Option<PendingWrite>,
}

impl<L: LedgerClient> SyncEngine<L> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut progress: ProgressReceiver,
        mut events: ReaderEvents,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(report) = progress.recv() => self.on_progress(report),
                Some(event) = events.next() => self.on_reader_event(event),
            }
        }

        self.tracker.abort();
        tracing::debug!("sync engine stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { text, reply } => {
                let result = self.submit(text);
                let _ = reply.send(result);
            }
            Command::Subscribe { id, mut listener } => {
                listener(&self.state);
                self.listeners.push((id, listener));
            }
            Command::Unsubscribe(id) => self.listeners.retain(|(l, _)| *l != id),
            Command::Refresh => self.reader.refresh_now(),
            Command::Shutdown => {}
        }
    }

    fn submit(&mut self, text: String) -> HeraldResult<TxId> {
        if text.is_empty() || text == self.state.latest.text() {
            return Err(SyncError::EmptyOrUnchanged);
        }

        let tx = self.tracker.submit(text.clone())?;
        let id = tx.id;

        self.pending = Some(PendingWrite {
            id,
            payload: text.clone(),
            base: self.state.latest.sequence(),
            confirmed: false,
        });
        self.state.draft = Some(text);
        self.state.last_error = None;
        self.state.active = Some(tx);
        self.publish();
        Ok(id)
    }

    fn on_progress(&mut self, report: TxProgress) {
        let Some(tx) = self.tracker.apply(report) else {
            return;
        };
        let status = tx.status;
        let error = tx.error.clone();
        self.state.active = Some(tx);

        match status {
            TxStatus::Confirmed => {
                self.publish();
                self.reader.refresh_now();

                let Some(pending) = self.pending.as_mut() else {
                    return;
                };
                pending.confirmed = true;

                // A value read after the submit may already be held; the
                // reader will not repeat it
                if self.state.latest.sequence() > pending.base {
                    self.finish_write();
                    self.publish();
                }
            }
            TxStatus::Failed(kind) => {
                self.state.last_error = error;
                self.publish();

                tracing::info!(%kind, "write failed, draft kept for retry");
                self.pending = None;
                self.reset_tracker();
                self.state.active = None;
                self.publish();
            }
            _ => self.publish(),
        }
    }

    fn on_reader_event(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::Value(value) => self.apply_value(value),
            ReaderEvent::Stale(error) => {
                self.state.staleness = Some(error);
                self.publish();
            }
            ReaderEvent::Recovered => {
                let recovered = self.state.staleness.take().is_some();
                // The ledger still holds the value we have
                if self.settle_unchanged() || recovered {
                    self.publish();
                }
            }
            ReaderEvent::Refreshed(_) => {
                if self.settle_unchanged() {
                    self.publish();
                }
            }
        }
    }

    /// A confirmed write whose post-confirmation read brought no new value
    /// settles on the value already held.
    fn settle_unchanged(&mut self) -> bool {
        if !self.pending.as_ref().is_some_and(|p| p.confirmed) {
            return false;
        }
        tracing::debug!(
            sequence = %self.state.latest.sequence(),
            "confirmed write read back unchanged"
        );
        self.finish_write();
        true
    }

    fn apply_value(&mut self, value: Value) {
        if !value.supersedes(&self.state.latest) {
            tracing::debug!(
                sequence = %value.sequence(),
                held = %self.state.latest.sequence(),
                "discarding out-of-order value"
            );
            return;
        }

        self.state.latest = value;
        self.state.staleness = None;

        let settled = self
            .pending
            .as_ref()
            .is_some_and(|p| p.confirmed && self.state.latest.sequence() > p.base);
        if settled {
            self.finish_write();
        }

        self.publish();
    }

    /// Confirmed and observed: clear the draft and free the tracker
    fn finish_write(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::info!(
                tx = %pending.id,
                sequence = %self.state.latest.sequence(),
                "write confirmed and observed"
            );
        }
        self.state.draft = None;
        self.reset_tracker();
        self.state.active = None;
    }

    fn reset_tracker(&mut self) {
        if let Err(err) = self.tracker.reset() {
            tracing::warn!("tracker reset refused: {}", err);
        }
    }

    fn publish(&mut self) {
        self.published.send_replace(self.state.clone());
        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.state);
        }
    }
}
