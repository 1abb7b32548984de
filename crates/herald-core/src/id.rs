//! Identity types for Herald
//!
//! Sequences order values observed by a reader; transaction ids identify
//! local write attempts. Neither is derived from ledger block numbers.

use std::fmt;

/// Read sequence number - assigned by the poller to each distinct value
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Sequence(pub u64);

impl Sequence {
    pub const ZERO: Sequence = Sequence(0);

    #[inline]
    pub fn new(seq: u64) -> Self {
        Sequence(seq)
    }

    /// The sequence immediately after this one
    #[inline]
    pub fn next(self) -> Self {
        Sequence(self.0.saturating_add(1))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Local write attempt identity - unique per tracker
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TxId(pub u64);

impl TxId {
    pub const ZERO: TxId = TxId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        TxId(id)
    }

    #[inline]
    pub fn next(self) -> Self {
        TxId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tx({})", self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}
