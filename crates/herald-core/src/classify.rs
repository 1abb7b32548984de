//! Error classification
//!
//! Maps raw ledger and signer failures into the closed [`ErrorKind`]
//! taxonomy. Classification is pure and total: anything unrecognised falls
//! through to `Unknown` with the raw message preserved.

use crate::{ClassifiedError, ErrorKind, RawError};

/// Default bound on revert messages without a readable reason
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 160;

/// EIP-1193 "user rejected the request"
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC execution error (revert)
pub const EXECUTION_ERROR_CODE: i64 = 3;

const REJECTION_PATTERNS: &[&str] = &[
    "user rejected",
    "user denied",
    "denied transaction signature",
    "rejected the request",
    "user cancelled",
    "user canceled",
];

const REVERT_PATTERNS: &[&str] = &["execution reverted", "reverted", "revert "];

const NETWORK_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "connection",
    "network",
    "econnrefused",
    "econnreset",
    "fetch failed",
    "dns",
    "unreachable",
    "broken pipe",
];

/// Classifier configuration
#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    /// Maximum length (in chars) of a revert message without a reason
    pub max_message_len: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

/// Deterministic raw-error to taxonomy mapping
#[derive(Clone, Debug, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default())
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        ErrorClassifier { config }
    }

    /// Classify a raw failure. Never fails.
    pub fn classify(&self, raw: &RawError) -> ClassifiedError {
        match raw {
            RawError::Deadline(deadline) => ClassifiedError::new(
                ErrorKind::Timeout,
                format!("no confirmation within {}s", deadline.as_secs()),
            ),
            RawError::Reverted { reason, message } => ClassifiedError::new(
                ErrorKind::ContractReverted,
                self.revert_message(reason.as_deref(), message),
            ),
            RawError::Transport(message) => {
                ClassifiedError::new(ErrorKind::NetworkError, self.truncate(message))
            }
            RawError::Http { status, message } => {
                if *status >= 500 || *status == 429 || *status == 408 {
                    ClassifiedError::new(
                        ErrorKind::NetworkError,
                        self.truncate(&format!("http {}: {}", status, message)),
                    )
                } else {
                    self.classify_text(message)
                }
            }
            RawError::Rpc { code, message, .. } => match *code {
                USER_REJECTED_CODE => {
                    ClassifiedError::new(ErrorKind::UserRejected, self.truncate(message))
                }
                EXECUTION_ERROR_CODE => ClassifiedError::new(
                    ErrorKind::ContractReverted,
                    self.revert_message(None, message),
                ),
                _ => self.classify_text(message),
            },
            RawError::Other(message) => self.classify_text(message),
        }
    }

    /// Pattern-match a free-form message
    fn classify_text(&self, message: &str) -> ClassifiedError {
        let lower = message.to_ascii_lowercase();

        if REJECTION_PATTERNS.iter().any(|p| lower.contains(p)) {
            return ClassifiedError::new(ErrorKind::UserRejected, self.truncate(message));
        }

        if REVERT_PATTERNS.iter().any(|p| lower.contains(p)) {
            return ClassifiedError::new(
                ErrorKind::ContractReverted,
                self.revert_message(None, message),
            );
        }

        if NETWORK_PATTERNS.iter().any(|p| lower.contains(p)) {
            return ClassifiedError::new(ErrorKind::NetworkError, self.truncate(message));
        }

        ClassifiedError::new(ErrorKind::Unknown, message)
    }

    /// Prefer a short human-readable reason, else the bounded raw message
    fn revert_message(&self, reason: Option<&str>, message: &str) -> String {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or_else(|| extract_reason(message));

        match reason {
            Some(reason) => self.truncate(reason),
            None => self.truncate(message),
        }
    }

    fn truncate(&self, message: &str) -> String {
        truncate_chars(message, self.config.max_message_len)
    }
}

/// Pull a revert reason out of common node and library message formats
pub fn extract_reason(message: &str) -> Option<&str> {
    // to_ascii_lowercase keeps byte offsets aligned with the original
    let lower = message.to_ascii_lowercase();

    const QUOTED: &str = "reverted with reason string '";
    if let Some(start) = lower.find(QUOTED) {
        let rest = &message[start + QUOTED.len()..];
        let reason = rest.split('\'').next().unwrap_or(rest);
        return non_empty(reason);
    }

    for marker in ["execution reverted: ", "revert: ", "revert "] {
        if let Some(start) = lower.find(marker) {
            let rest = &message[start + marker.len()..];
            let reason = rest.lines().next().unwrap_or(rest);
            return non_empty(reason);
        }
    }

    None
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

const ELLIPSIS: &str = "...";

/// Truncate on a char boundary, marking the cut with `...` when the bound
/// leaves room for it. The result never exceeds `max_len` chars.
pub fn truncate_chars(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }

    let marker = if max_len > ELLIPSIS.len() { ELLIPSIS } else { "" };
    let keep = max_len - marker.len();
    let end = message
        .char_indices()
        .nth(keep)
        .map_or(message.len(), |(i, _)| i);
    format!("{}{}", &message[..end], marker)
}
