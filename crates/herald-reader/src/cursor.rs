//! Read cursor - deduplication and sequencing of poll results
//!
//! Every read is issued with a ticket. A result is only considered if no
//! newer read has already succeeded, so a slow interval read overtaken by a
//! forced refresh can never allocate a sequence number.

use herald_core::{Sequence, Value};

/// What a completed read means for observers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A new distinct value
    Changed(Value),
    /// Same value as before, first success after failures
    Recovered,
    /// Same value as before
    Unchanged,
    /// A newer read already completed; result dropped
    Superseded,
}

/// Dedup and ordering state shared across reader restarts
#[derive(Clone, Debug, Default)]
pub struct ReadCursor {
    last: Option<Value>,
    sequence: Sequence,
    next_ticket: u64,
    last_success: u64,
    stale: bool,
}

impl ReadCursor {
    pub fn new() -> Self {
        ReadCursor::default()
    }

    /// Allocate a ticket for a read about to be issued
    pub fn issue(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Record a successful read
    pub fn accept(&mut self, ticket: u64, text: &str) -> ReadOutcome {
        if ticket < self.last_success {
            return ReadOutcome::Superseded;
        }
        self.last_success = ticket;
        let was_stale = std::mem::take(&mut self.stale);

        if self.last.as_ref().is_some_and(|v| v.text() == text) {
            return if was_stale {
                ReadOutcome::Recovered
            } else {
                ReadOutcome::Unchanged
            };
        }

        self.sequence = self.sequence.next();
        let value = Value::new(text, self.sequence);
        self.last = Some(value.clone());
        ReadOutcome::Changed(value)
    }

    /// Record a failed read. Returns false if a newer read already succeeded.
    pub fn fail(&mut self, ticket: u64) -> bool {
        if ticket < self.last_success {
            return false;
        }
        self.stale = true;
        true
    }

    /// Latest emitted value
    pub fn latest(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}
