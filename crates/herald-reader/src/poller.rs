//! Polling reader - background read loop

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};

use herald_core::{ClassifiedError, ErrorClassifier, LedgerClient, RawError, Sequence, Value};

use crate::{Backoff, ReadCursor, ReadOutcome};

/// Polling configuration
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Delay between successful reads
    pub interval: Duration,
    /// First retry delay after a failed read
    pub backoff_base: Duration,
    /// Retry delay cap
    pub backoff_max: Duration,
    /// Fraction of each retry delay to randomise
    pub jitter: f64,
    /// Capacity of the event channel
    pub event_buffer: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: Duration::from_secs(10),
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(30),
            jitter: 0.0,
            event_buffer: 64,
        }
    }
}

impl PollConfig {
    /// Short intervals for local development ledgers
    pub fn fast() -> Self {
        PollConfig {
            interval: Duration::from_secs(1),
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(5),
            jitter: 0.0,
            event_buffer: 64,
        }
    }
}

/// Event produced by the read loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A new distinct value
    Value(Value),
    /// A read failed; the last value may be out of date
    Stale(ClassifiedError),
    /// Reads succeed again and the value did not change meanwhile
    Recovered,
    /// An out-of-cycle read succeeded. Follows the `Value` it produced, if
    /// any, and carries the sequence of the latest value at that point.
    Refreshed(Sequence),
}

/// Stream of reader events
pub struct ReaderEvents {
    rx: mpsc::Receiver<ReaderEvent>,
}

impl ReaderEvents {
    /// Next event; `None` once the reader has stopped
    pub async fn next(&mut self) -> Option<ReaderEvent> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<ReaderEvent> {
        self.rx.try_recv().ok()
    }
}

/// Periodic reader of the ledger value.
///
/// The cursor outlives individual runs, so `start` after `stop` continues
/// the sequence instead of re-emitting known values.
pub struct PollingReader<L: LedgerClient> {
    ledger: Arc<L>,
    config: PollConfig,
    classifier: ErrorClassifier,
    cursor: Arc<Mutex<ReadCursor>>,
}

impl<L: LedgerClient> PollingReader<L> {
    pub fn new(ledger: Arc<L>, config: PollConfig) -> Self {
        Self::with_classifier(ledger, config, ErrorClassifier::new())
    }

    pub fn with_classifier(ledger: Arc<L>, config: PollConfig, classifier: ErrorClassifier) -> Self {
        PollingReader {
            ledger,
            config,
            classifier,
            cursor: Arc::new(Mutex::new(ReadCursor::new())),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Start polling at the configured interval
    pub fn start(&self) -> (ReaderHandle, ReaderEvents) {
        self.start_with_interval(self.config.interval)
    }

    /// Start polling. The first read is issued immediately.
    pub fn start_with_interval(&self, interval: Duration) -> (ReaderHandle, ReaderEvents) {
        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let read_loop = ReadLoop {
            ledger: Arc::clone(&self.ledger),
            cursor: Arc::clone(&self.cursor),
            classifier: self.classifier.clone(),
            backoff: Backoff::new(self.config.backoff_base, self.config.backoff_max)
                .with_jitter(self.config.jitter),
            interval,
            events: events_tx,
        };

        tracing::debug!(interval = ?interval, "starting polling reader");
        let task = tokio::spawn(read_loop.run(refresh_rx));

        (
            ReaderHandle { refresh_tx, task },
            ReaderEvents { rx: events_rx },
        )
    }

    /// Latest value emitted by any run of this reader
    pub fn latest(&self) -> Option<Value> {
        self.cursor.lock().latest().cloned()
    }

    /// True while the most recent read failed
    pub fn is_stale(&self) -> bool {
        self.cursor.lock().is_stale()
    }
}

/// Control handle of a running reader.
///
/// Dropping the handle stops the reader and cancels in-flight reads.
pub struct ReaderHandle {
    refresh_tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    /// Issue an out-of-cycle read; the interval timer is not reset
    pub fn refresh_now(&self) {
        if self.refresh_tx.send(()).is_err() {
            tracing::debug!("refresh requested on stopped reader");
        }
    }

    /// Cancel the timer and all pending reads
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadKind {
    Tick,
    Refresh,
}

struct ReadLoop<L> {
    ledger: Arc<L>,
    cursor: Arc<Mutex<ReadCursor>>,
    classifier: ErrorClassifier,
    backoff: Backoff,
    interval: Duration,
    events: mpsc::Sender<ReaderEvent>,
}

type ReadResult = (u64, ReadKind, Result<String, RawError>);

impl<L: LedgerClient> ReadLoop<L> {
    async fn run(mut self, mut refresh_rx: mpsc::UnboundedReceiver<()>) {
        // In-flight reads die with the loop when the JoinSet is dropped
        let mut reads: JoinSet<ReadResult> = JoinSet::new();
        let mut next_tick = Some(Instant::now());

        loop {
            let tick_at = next_tick.unwrap_or_else(|| Instant::now() + self.interval);

            tokio::select! {
                _ = sleep_until(tick_at), if next_tick.is_some() => {
                    next_tick = None;
                    self.spawn_read(&mut reads, ReadKind::Tick);
                }
                request = refresh_rx.recv() => match request {
                    Some(()) => self.spawn_read(&mut reads, ReadKind::Refresh),
                    None => break,
                },
                Some(joined) = reads.join_next() => {
                    let Ok((ticket, kind, result)) = joined else {
                        tracing::warn!("read task ended abnormally");
                        if next_tick.is_none() && reads.is_empty() {
                            next_tick = Some(Instant::now() + self.interval);
                        }
                        continue;
                    };

                    let refreshed = kind == ReadKind::Refresh && result.is_ok();
                    let (event, delay) = self.complete(ticket, kind, result);
                    if kind == ReadKind::Tick {
                        next_tick = Some(Instant::now() + delay);
                    }

                    let sequence = self.cursor.lock().sequence();
                    let events = event
                        .into_iter()
                        .chain(refreshed.then_some(ReaderEvent::Refreshed(sequence)));
                    let mut closed = false;
                    for event in events {
                        if self.events.send(event).await.is_err() {
                            closed = true; // Receiver dropped
                            break;
                        }
                    }
                    if closed {
                        break;
                    }
                }
            }
        }

        tracing::debug!("polling reader stopped");
    }

    fn spawn_read(&self, reads: &mut JoinSet<ReadResult>, kind: ReadKind) {
        let ticket = self.cursor.lock().issue();
        let ledger = Arc::clone(&self.ledger);
        tracing::trace!(ticket, ?kind, "issuing read");

        reads.spawn(async move {
            let result = ledger.read().await;
            (ticket, kind, result)
        });
    }

    /// Fold a read result into the cursor; returns the event and next tick delay
    fn complete(
        &mut self,
        ticket: u64,
        kind: ReadKind,
        result: Result<String, RawError>,
    ) -> (Option<ReaderEvent>, Duration) {
        match result {
            Ok(text) => {
                self.backoff.reset();
                let outcome = self.cursor.lock().accept(ticket, &text);

                let event = match outcome {
                    ReadOutcome::Changed(value) => {
                        tracing::debug!(sequence = %value.sequence(), "ledger value changed");
                        Some(ReaderEvent::Value(value))
                    }
                    ReadOutcome::Recovered => {
                        tracing::info!("ledger reads recovered");
                        Some(ReaderEvent::Recovered)
                    }
                    ReadOutcome::Unchanged => None,
                    ReadOutcome::Superseded => {
                        tracing::debug!(ticket, "discarding overtaken read");
                        None
                    }
                };
                (event, self.interval)
            }
            Err(raw) => {
                let error = self.classifier.classify(&raw);
                let emit = self.cursor.lock().fail(ticket);

                let delay = match kind {
                    ReadKind::Tick => self.backoff.next_delay(),
                    ReadKind::Refresh => self.interval,
                };

                if emit {
                    tracing::warn!(
                        kind = %error.kind,
                        retry_in = ?delay,
                        "ledger read failed: {}",
                        error.message
                    );
                    (Some(ReaderEvent::Stale(error)), delay)
                } else {
                    tracing::debug!(ticket, "discarding overtaken read failure");
                    (None, delay)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;

    use herald_core::{ErrorKind, Receipt, TransactionHandle};

    /// Scripted read results, each with its own latency
    #[derive(Default)]
    struct ScriptedLedger {
        script: Mutex<VecDeque<(Duration, Result<String, RawError>)>>,
        fallback: Mutex<String>,
        reads: Mutex<Vec<Instant>>,
    }

    impl ScriptedLedger {
        fn new(fallback: &str) -> Arc<Self> {
            let ledger = ScriptedLedger::default();
            *ledger.fallback.lock() = fallback.to_string();
            Arc::new(ledger)
        }

        fn push(&self, latency: Duration, result: Result<&str, RawError>) {
            self.script
                .lock()
                .push_back((latency, result.map(str::to_string)));
        }

        fn read_times(&self) -> Vec<Instant> {
            self.reads.lock().clone()
        }
    }

    struct NoHandle;

    impl TransactionHandle for NoHandle {
        fn id(&self) -> String {
            String::new()
        }

        fn accepted(&mut self) -> impl Future<Output = Result<(), RawError>> + Send {
            async { Ok(()) }
        }

        fn wait(self) -> impl Future<Output = Result<Receipt, RawError>> + Send {
            async { Err(RawError::other("read-only")) }
        }
    }

    impl LedgerClient for ScriptedLedger {
        type Handle = NoHandle;

        fn read(&self) -> impl Future<Output = Result<String, RawError>> + Send {
            self.reads.lock().push(Instant::now());
            let next = self.script.lock().pop_front();
            let fallback = self.fallback.lock().clone();
            async move {
                match next {
                    Some((latency, result)) => {
                        tokio::time::sleep(latency).await;
                        result
                    }
                    None => Ok(fallback),
                }
            }
        }

        fn write(&self, _payload: &str) -> impl Future<Output = Result<NoHandle, RawError>> + Send {
            async { Err(RawError::other("read-only")) }
        }
    }

    fn config() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(10),
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(30),
            jitter: 0.0,
            event_buffer: 16,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_initial_value_then_dedups() {
        let ledger = ScriptedLedger::new("hello");
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let (handle, mut events) = reader.start();

        let first = events.next().await.unwrap();
        assert_eq!(
            first,
            ReaderEvent::Value(Value::new("hello", Sequence::new(1)))
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(events.try_next().is_none());
        assert!(ledger.read_times().len() >= 4);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_advances_sequence() {
        let ledger = ScriptedLedger::new("b");
        ledger.push(Duration::ZERO, Ok("a"));
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let (_handle, mut events) = reader.start();

        assert_eq!(
            events.next().await,
            Some(ReaderEvent::Value(Value::new("a", Sequence::new(1))))
        );
        assert_eq!(
            events.next().await,
            Some(ReaderEvent::Value(Value::new("b", Sequence::new(2))))
        );
        assert_eq!(reader.latest().map(|v| v.sequence()), Some(Sequence::new(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_backs_off_then_recovers() {
        let ledger = ScriptedLedger::new("a");
        ledger.push(Duration::ZERO, Ok("a"));
        ledger.push(Duration::ZERO, Err(RawError::transport("connection refused")));
        ledger.push(Duration::ZERO, Err(RawError::transport("connection refused")));
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let start = Instant::now();
        let (_handle, mut events) = reader.start();

        assert!(matches!(events.next().await, Some(ReaderEvent::Value(_))));

        match events.next().await {
            Some(ReaderEvent::Stale(err)) => assert_eq!(err.kind, ErrorKind::NetworkError),
            other => panic!("unexpected {:?}", other),
        }
        assert!(reader.is_stale());
        assert!(matches!(events.next().await, Some(ReaderEvent::Stale(_))));
        assert_eq!(events.next().await, Some(ReaderEvent::Recovered));
        assert!(!reader.is_stale());

        // 0s ok, 10s fail, +2s fail, +4s ok
        let offsets: Vec<u64> = ledger
            .read_times()
            .iter()
            .take(4)
            .map(|t| (*t - start).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 10, 12, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_does_not_reset_timer() {
        let ledger = ScriptedLedger::new("a");
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let start = Instant::now();
        let (handle, mut events) = reader.start();
        events.next().await;

        tokio::time::sleep(Duration::from_secs(4)).await;
        handle.refresh_now();
        tokio::time::sleep(Duration::from_secs(7)).await;

        let offsets: Vec<u64> = ledger
            .read_times()
            .iter()
            .map(|t| (*t - start).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 4, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_refresh_still_reports_completion() {
        let ledger = ScriptedLedger::new("same");
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let (handle, mut events) = reader.start();
        assert!(matches!(events.next().await, Some(ReaderEvent::Value(_))));

        handle.refresh_now();
        assert_eq!(
            events.next().await,
            Some(ReaderEvent::Refreshed(Sequence::new(1)))
        );

        // Interval reads stay silent when nothing changed
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(events.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_reports_no_completion() {
        let ledger = ScriptedLedger::new("same");
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let (handle, mut events) = reader.start();
        events.next().await;

        ledger.push(Duration::ZERO, Err(RawError::transport("connection reset")));
        handle.refresh_now();
        assert!(matches!(events.next().await, Some(ReaderEvent::Stale(_))));

        // The next interval read succeeds unchanged
        assert_eq!(events.next().await, Some(ReaderEvent::Recovered));
        assert!(events.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overtaken_read_is_discarded() {
        let ledger = ScriptedLedger::new("fresh");
        ledger.push(Duration::ZERO, Ok("a"));
        // Slow interval read returning an old value
        ledger.push(Duration::from_secs(5), Ok("old"));
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let (handle, mut events) = reader.start();
        events.next().await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.refresh_now();

        assert_eq!(
            events.next().await,
            Some(ReaderEvent::Value(Value::new("fresh", Sequence::new(2))))
        );
        assert_eq!(
            events.next().await,
            Some(ReaderEvent::Refreshed(Sequence::new(2)))
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(events.try_next().is_none());
        assert_eq!(reader.latest().map(|v| v.text().to_string()), Some("fresh".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reads() {
        let ledger = ScriptedLedger::new("a");
        ledger.push(Duration::from_secs(3), Ok("late"));
        let reader = PollingReader::new(Arc::clone(&ledger), config());
        let (handle, mut events) = reader.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(events.next().await, None);
        assert_eq!(ledger.read_times().len(), 1);
        assert!(reader.latest().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_continues_sequence() {
        let ledger = ScriptedLedger::new("a");
        let reader = PollingReader::new(Arc::clone(&ledger), config());

        let (handle, mut events) = reader.start();
        assert!(matches!(events.next().await, Some(ReaderEvent::Value(_))));
        handle.stop();

        *ledger.fallback.lock() = "b".into();
        let (_handle, mut events) = reader.start();
        assert_eq!(
            events.next().await,
            Some(ReaderEvent::Value(Value::new("b", Sequence::new(2))))
        );
    }
}
