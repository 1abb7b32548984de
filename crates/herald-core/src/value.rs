//! Sequenced ledger values

use std::fmt;
use std::sync::Arc;

use crate::Sequence;

/// Immutable snapshot of the ledger string, tagged with its read sequence.
///
/// Values are never mutated; a newer read replaces the whole value.
#[derive(Clone, PartialEq, Eq)]
pub struct Value {
    text: Arc<str>,
    sequence: Sequence,
}

impl Value {
    pub fn new(text: impl Into<Arc<str>>, sequence: Sequence) -> Self {
        Value {
            text: text.into(),
            sequence,
        }
    }

    /// Empty value held before the first read
    pub fn initial() -> Self {
        Value::new("", Sequence::ZERO)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// True if this value was read after `other`
    pub fn supersedes(&self, other: &Value) -> bool {
        self.sequence > other.sequence
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::initial()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?} @ {:?})", self.text, self.sequence)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
