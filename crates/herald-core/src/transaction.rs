//! Write transactions and their lifecycle
//!
//! The lifecycle is a pure state machine:
//!
//! ```text
//! Idle -> AwaitingSignature -> Submitted -> Confirming -> Confirmed
//!                 \                 \             \
//!                  +-> Failed        +-> Failed    +-> Failed
//! ```
//!
//! Terminal states only leave through an explicit `Reset`.

use std::time::{Duration, SystemTime};

use crate::{ClassifiedError, ErrorKind, InvalidTransition, TxId};

/// Proof of finality returned by the ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Ledger transaction handle (hash)
    pub handle: String,
    /// Block the transaction was included in, if the ledger reports one
    pub block: Option<u64>,
}

/// Transaction status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Idle,
    AwaitingSignature,
    Submitted,
    Confirming,
    Confirmed,
    Failed(ErrorKind),
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed(_))
    }

    /// Neither idle nor terminal
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            TxStatus::AwaitingSignature | TxStatus::Submitted | TxStatus::Confirming
        )
    }

    pub fn is_idle(self) -> bool {
        self == TxStatus::Idle
    }

    /// Pure transition function.
    ///
    /// Failure kinds are pinned to the stage they happen in: a failure while
    /// awaiting the signature is a rejection unless it was a network error, a
    /// failure after signing is a broadcast error unless the ledger reverted.
    ///
    /// A signer that cannot be reached has not declined anything, so it stays
    /// a `NetworkError` and the caller may retry it as one. While confirming,
    /// the classified kind is kept as is: a revert, a lost connection and an
    /// unknown failure need different handling after the write was sent.
    pub fn next(self, event: &TxEvent) -> Result<TxStatus, InvalidTransition> {
        use TxStatus::*;

        let next = match (self, event) {
            (Idle, TxEvent::Submit) => AwaitingSignature,
            (AwaitingSignature, TxEvent::Signed(_)) => Submitted,
            (AwaitingSignature, TxEvent::Failed(err)) => match err.kind {
                ErrorKind::NetworkError => Failed(ErrorKind::NetworkError),
                _ => Failed(ErrorKind::UserRejected),
            },
            (Submitted, TxEvent::Accepted) => Confirming,
            (Submitted, TxEvent::Failed(err)) => match err.kind {
                ErrorKind::ContractReverted => Failed(ErrorKind::ContractReverted),
                _ => Failed(ErrorKind::NetworkError),
            },
            (Confirming, TxEvent::Finalized(_)) => Confirmed,
            (Confirming, TxEvent::Failed(err)) => Failed(err.kind),
            (Confirming, TxEvent::DeadlineElapsed(_)) => Failed(ErrorKind::Timeout),
            (Confirmed | Failed(_), TxEvent::Reset) => Idle,
            (from, event) => {
                return Err(InvalidTransition {
                    from,
                    event: event.name(),
                })
            }
        };

        Ok(next)
    }
}

/// Input to the transaction state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxEvent {
    Submit,
    /// Signer produced a ledger handle
    Signed(String),
    /// Ledger acknowledged receipt
    Accepted,
    Finalized(Receipt),
    Failed(ClassifiedError),
    DeadlineElapsed(Duration),
    Reset,
}

impl TxEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TxEvent::Submit => "submit",
            TxEvent::Signed(_) => "signed",
            TxEvent::Accepted => "accepted",
            TxEvent::Finalized(_) => "finalized",
            TxEvent::Failed(_) => "failed",
            TxEvent::DeadlineElapsed(_) => "deadline elapsed",
            TxEvent::Reset => "reset",
        }
    }
}

/// One write attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxId,
    /// Ledger handle, known once signed
    pub handle: Option<String>,
    pub payload: String,
    pub status: TxStatus,
    pub submitted_at: SystemTime,
    /// Terminal error, if the attempt failed
    pub error: Option<ClassifiedError>,
    pub receipt: Option<Receipt>,
}

impl Transaction {
    pub fn new(id: TxId, payload: impl Into<String>) -> Self {
        Transaction {
            id,
            handle: None,
            payload: payload.into(),
            status: TxStatus::Idle,
            submitted_at: SystemTime::now(),
            error: None,
            receipt: None,
        }
    }

    /// Apply an event, recording its payload on success
    pub fn apply(&mut self, event: TxEvent) -> Result<TxStatus, InvalidTransition> {
        let next = self.status.next(&event)?;

        match event {
            TxEvent::Submit => self.submitted_at = SystemTime::now(),
            TxEvent::Signed(handle) => self.handle = Some(handle),
            TxEvent::Finalized(receipt) => self.receipt = Some(receipt),
            TxEvent::Failed(err) => {
                if let TxStatus::Failed(kind) = next {
                    self.error = Some(ClassifiedError::new(kind, err.message));
                }
            }
            TxEvent::DeadlineElapsed(deadline) => {
                self.error = Some(ClassifiedError::new(
                    ErrorKind::Timeout,
                    format!("no confirmation within {}s", deadline.as_secs()),
                ));
            }
            TxEvent::Accepted | TxEvent::Reset => {}
        }

        self.status = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(kind: ErrorKind) -> TxEvent {
        TxEvent::Failed(ClassifiedError::new(kind, "boom"))
    }

    #[test]
    fn test_happy_path() {
        let mut tx = Transaction::new(TxId::new(1), "Hello");
        assert_eq!(tx.apply(TxEvent::Submit), Ok(TxStatus::AwaitingSignature));
        assert_eq!(
            tx.apply(TxEvent::Signed("0xabc".into())),
            Ok(TxStatus::Submitted)
        );
        assert_eq!(tx.apply(TxEvent::Accepted), Ok(TxStatus::Confirming));

        let receipt = Receipt {
            handle: "0xabc".into(),
            block: Some(7),
        };
        assert_eq!(
            tx.apply(TxEvent::Finalized(receipt.clone())),
            Ok(TxStatus::Confirmed)
        );
        assert_eq!(tx.handle.as_deref(), Some("0xabc"));
        assert_eq!(tx.receipt, Some(receipt));
        assert!(tx.error.is_none());
    }

    #[test]
    fn test_signature_failures_become_rejections() {
        assert_eq!(
            TxStatus::AwaitingSignature.next(&failed(ErrorKind::Unknown)),
            Ok(TxStatus::Failed(ErrorKind::UserRejected))
        );
        assert_eq!(
            TxStatus::AwaitingSignature.next(&failed(ErrorKind::NetworkError)),
            Ok(TxStatus::Failed(ErrorKind::NetworkError))
        );
    }

    #[test]
    fn test_broadcast_failures_become_network_errors() {
        assert_eq!(
            TxStatus::Submitted.next(&failed(ErrorKind::Unknown)),
            Ok(TxStatus::Failed(ErrorKind::NetworkError))
        );
        assert_eq!(
            TxStatus::Submitted.next(&failed(ErrorKind::ContractReverted)),
            Ok(TxStatus::Failed(ErrorKind::ContractReverted))
        );
    }

    #[test]
    fn test_confirming_failures() {
        assert_eq!(
            TxStatus::Confirming.next(&failed(ErrorKind::ContractReverted)),
            Ok(TxStatus::Failed(ErrorKind::ContractReverted))
        );
        assert_eq!(
            TxStatus::Confirming.next(&TxEvent::DeadlineElapsed(Duration::from_secs(5))),
            Ok(TxStatus::Failed(ErrorKind::Timeout))
        );
        assert_eq!(
            TxStatus::Confirming.next(&failed(ErrorKind::NetworkError)),
            Ok(TxStatus::Failed(ErrorKind::NetworkError))
        );
        assert_eq!(
            TxStatus::Confirming.next(&failed(ErrorKind::Unknown)),
            Ok(TxStatus::Failed(ErrorKind::Unknown))
        );
    }

    #[test]
    fn test_unreachable_signer_is_retryable() {
        let next = TxStatus::AwaitingSignature.next(&failed(ErrorKind::NetworkError));
        assert_eq!(next, Ok(TxStatus::Failed(ErrorKind::NetworkError)));
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(!ErrorKind::UserRejected.is_retryable());
    }

    #[test]
    fn test_failure_records_stage_kind() {
        let mut tx = Transaction::new(TxId::new(1), "Hi");
        tx.apply(TxEvent::Submit).unwrap();
        tx.apply(failed(ErrorKind::Unknown)).unwrap();

        let err = tx.error.unwrap();
        assert_eq!(err.kind, ErrorKind::UserRejected);
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_terminal_requires_reset() {
        assert!(TxStatus::Confirmed.next(&TxEvent::Submit).is_err());
        assert!(TxStatus::Failed(ErrorKind::Timeout).next(&TxEvent::Submit).is_err());
        assert_eq!(TxStatus::Confirmed.next(&TxEvent::Reset), Ok(TxStatus::Idle));
        assert_eq!(
            TxStatus::Failed(ErrorKind::Timeout).next(&TxEvent::Reset),
            Ok(TxStatus::Idle)
        );
    }

    #[test]
    fn test_illegal_transitions() {
        let err = TxStatus::Idle.next(&TxEvent::Accepted).unwrap_err();
        assert_eq!(err.from, TxStatus::Idle);
        assert_eq!(err.event, "accepted");

        assert!(TxStatus::Submitted.next(&TxEvent::Signed("x".into())).is_err());
        assert!(TxStatus::Confirming.next(&TxEvent::Reset).is_err());
        assert!(TxStatus::Idle.next(&TxEvent::Reset).is_err());
    }

    #[test]
    fn test_status_predicates() {
        assert!(TxStatus::Idle.is_idle());
        assert!(TxStatus::Submitted.is_in_flight());
        assert!(!TxStatus::Confirmed.is_in_flight());
        assert!(TxStatus::Failed(ErrorKind::Unknown).is_terminal());
    }
}
