//! RPC client errors

use herald_core::RawError;
use thiserror::Error;

use crate::{decode_revert_reason, AbiError};

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("malformed response to {method}: {reason}")]
    Decode { method: &'static str, reason: String },

    #[error("abi: {0}")]
    Abi(#[from] AbiError),

    #[error("no account available to sign with")]
    NoAccount,

    #[error("transaction {0} not seen by the node")]
    NotSeen(String),

    #[error("transaction {0} reverted")]
    Reverted(String),
}

impl From<RpcError> for RawError {
    fn from(err: RpcError) -> Self {
        let message = err.to_string();
        match err {
            RpcError::Request(e) if e.is_decode() => RawError::Other(message),
            RpcError::Request(_) => RawError::Transport(message),
            RpcError::Status { status, body } => RawError::Http {
                status,
                message: body,
            },
            RpcError::Rpc {
                code,
                message,
                data,
            } => {
                let data = data.map(|d| match d {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                });
                match data.as_deref().and_then(decode_revert_reason) {
                    Some(reason) => RawError::Reverted {
                        reason: Some(reason),
                        message,
                    },
                    None => RawError::Rpc {
                        code,
                        message,
                        data,
                    },
                }
            }
            RpcError::NotSeen(_) => RawError::Transport(message),
            RpcError::Reverted(_) => RawError::Reverted {
                reason: None,
                message,
            },
            RpcError::Decode { .. } | RpcError::Abi(_) | RpcError::NoAccount => {
                RawError::Other(message)
            }
        }
    }
}
