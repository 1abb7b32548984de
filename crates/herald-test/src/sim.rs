//! Simulated ledger
//!
//! Holds one value in memory. Reads observe the value at the moment they are
//! issued, then complete after their latency, so a slow read can carry an
//! outdated value past a fast one. Writes become visible when they confirm.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use herald_core::{LedgerClient, RawError, Receipt, TransactionHandle};

/// Scripted failure for the next write
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteFault {
    /// Signer declines (EIP-1193 code 4001)
    Reject,
    /// Signing fails with the given error
    SignError(RawError),
    /// The ledger never acknowledges the transaction
    AcceptError(RawError),
    /// Execution reverts, optionally with a reason
    Revert(Option<String>),
    /// Waiting for finality fails with the given error
    ConfirmError(RawError),
    /// Never finalizes
    Stall,
    /// Confirms, but another write in the same block replaces the value
    Overwritten(String),
}

/// Simulated ledger timing
#[derive(Clone, Debug)]
pub struct SimConfig {
    pub read_latency: Duration,
    pub sign_latency: Duration,
    pub accept_latency: Duration,
    pub confirm_latency: Duration,
    /// Uniform extra latency added to every step, in milliseconds
    pub jitter_ms: u32,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            read_latency: Duration::from_millis(100),
            sign_latency: Duration::from_secs(1),
            accept_latency: Duration::from_millis(500),
            confirm_latency: Duration::from_secs(3),
            jitter_ms: 0,
            seed: 42,
        }
    }
}

impl SimConfig {
    /// No latency at all
    pub fn instant() -> Self {
        SimConfig {
            read_latency: Duration::ZERO,
            sign_latency: Duration::ZERO,
            accept_latency: Duration::ZERO,
            confirm_latency: Duration::ZERO,
            jitter_ms: 0,
            seed: 42,
        }
    }
}

struct SimState {
    value: String,
    block: u64,
    next_hash: u64,
    reads: u64,
    read_faults: VecDeque<RawError>,
    read_delays: VecDeque<Duration>,
    write_faults: VecDeque<WriteFault>,
    signed: Vec<String>,
    rng: StdRng,
}

struct Shared {
    config: SimConfig,
    state: Mutex<SimState>,
}

impl Shared {
    fn latency(&self, base: Duration) -> Duration {
        if self.config.jitter_ms == 0 {
            return base;
        }
        let extra = self.state.lock().rng.gen_range(0..=self.config.jitter_ms);
        base + Duration::from_millis(extra as u64)
    }

    fn commit(&self, payload: &str) -> u64 {
        let mut state = self.state.lock();
        state.value = payload.to_string();
        state.block += 1;
        state.block
    }
}

/// In-memory ledger for tests
#[derive(Clone)]
pub struct SimLedger {
    shared: Arc<Shared>,
}

impl SimLedger {
    pub fn new(initial: &str) -> Self {
        Self::with_config(initial, SimConfig::default())
    }

    pub fn with_config(initial: &str, config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        SimLedger {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(SimState {
                    value: initial.to_string(),
                    block: 0,
                    next_hash: 0,
                    reads: 0,
                    read_faults: VecDeque::new(),
                    read_delays: VecDeque::new(),
                    write_faults: VecDeque::new(),
                    signed: Vec::new(),
                    rng,
                }),
            }),
        }
    }

    /// Current value
    pub fn value(&self) -> String {
        self.shared.state.lock().value.clone()
    }

    /// Change the value as another writer would
    pub fn set_value(&self, text: &str) {
        self.shared.commit(text);
    }

    /// Fail the next read
    pub fn push_read_fault(&self, err: RawError) {
        self.shared.state.lock().read_faults.push_back(err);
    }

    /// Fail the next `n` reads with the same error
    pub fn fail_next_reads(&self, n: usize, err: RawError) {
        let mut state = self.shared.state.lock();
        state
            .read_faults
            .extend(std::iter::repeat(err).take(n));
    }

    /// Override the latency of the next read
    pub fn push_read_delay(&self, delay: Duration) {
        self.shared.state.lock().read_delays.push_back(delay);
    }

    /// Script the outcome of the next write
    pub fn push_write_fault(&self, fault: WriteFault) {
        self.shared.state.lock().write_faults.push_back(fault);
    }

    /// Reads issued so far
    pub fn reads(&self) -> u64 {
        self.shared.state.lock().reads
    }

    /// Payloads that were signed, in order
    pub fn signed(&self) -> Vec<String> {
        self.shared.state.lock().signed.clone()
    }

    fn sign(&self, payload: &str) -> String {
        let mut state = self.shared.state.lock();
        state.next_hash += 1;
        state.signed.push(payload.to_string());
        format!("0x{:064x}", state.next_hash)
    }
}

impl LedgerClient for SimLedger {
    type Handle = SimHandle;

    fn read(&self) -> impl Future<Output = Result<String, RawError>> + Send {
        let (delay, result) = {
            let mut state = self.shared.state.lock();
            state.reads += 1;
            let delay = state.read_delays.pop_front();
            let result = match state.read_faults.pop_front() {
                Some(err) => Err(err),
                None => Ok(state.value.clone()),
            };
            (delay, result)
        };
        let latency = delay.unwrap_or_else(|| self.shared.latency(self.shared.config.read_latency));

        async move {
            tokio::time::sleep(latency).await;
            result
        }
    }

    fn write(&self, payload: &str) -> impl Future<Output = Result<SimHandle, RawError>> + Send {
        let ledger = self.clone();
        let payload = payload.to_string();

        async move {
            let latency = ledger.shared.latency(ledger.shared.config.sign_latency);
            tokio::time::sleep(latency).await;

            let fault = ledger.shared.state.lock().write_faults.pop_front();
            match &fault {
                Some(WriteFault::Reject) => {
                    return Err(RawError::Rpc {
                        code: 4001,
                        message: "User rejected the request.".into(),
                        data: None,
                    })
                }
                Some(WriteFault::SignError(err)) => return Err(err.clone()),
                _ => {}
            }

            let hash = ledger.sign(&payload);
            tracing::debug!(%hash, "simulated transaction signed");
            Ok(SimHandle {
                shared: Arc::clone(&ledger.shared),
                hash,
                payload,
                fault,
            })
        }
    }
}

/// A signed simulated write
pub struct SimHandle {
    shared: Arc<Shared>,
    hash: String,
    payload: String,
    fault: Option<WriteFault>,
}

impl TransactionHandle for SimHandle {
    fn id(&self) -> String {
        self.hash.clone()
    }

    fn accepted(&mut self) -> impl Future<Output = Result<(), RawError>> + Send {
        let latency = self.shared.latency(self.shared.config.accept_latency);
        let fault = match &self.fault {
            Some(WriteFault::AcceptError(err)) => Some(err.clone()),
            _ => None,
        };

        async move {
            tokio::time::sleep(latency).await;
            match fault {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn wait(self) -> impl Future<Output = Result<Receipt, RawError>> + Send {
        async move {
            let latency = self.shared.latency(self.shared.config.confirm_latency);
            tokio::time::sleep(latency).await;

            match self.fault {
                Some(WriteFault::Revert(reason)) => Err(RawError::Reverted {
                    message: match &reason {
                        Some(r) => format!("execution reverted: {r}"),
                        None => "execution reverted".to_string(),
                    },
                    reason,
                }),
                Some(WriteFault::ConfirmError(err)) => Err(err),
                Some(WriteFault::Stall) => std::future::pending().await,
                Some(WriteFault::Overwritten(text)) => {
                    self.shared.commit(&self.payload);
                    let block = self.shared.commit(&text);
                    Ok(Receipt {
                        handle: self.hash,
                        block: Some(block),
                    })
                }
                _ => {
                    let block = self.shared.commit(&self.payload);
                    Ok(Receipt {
                        handle: self.hash,
                        block: Some(block),
                    })
                }
            }
        }
    }
}
