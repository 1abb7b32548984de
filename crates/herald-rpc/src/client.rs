//! JSON-RPC ledger client

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as Json};

use herald_core::{LedgerClient, RawError, Receipt, TransactionHandle};

use crate::{
    decode_string, encode_call, encode_string_call, RpcError, GET_MESSAGE_SELECTOR,
    SET_MESSAGE_SELECTOR,
};

/// RPC client configuration
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// HTTP(S) JSON-RPC endpoint
    pub endpoint: String,
    /// Message-board contract address
    pub contract: String,
    /// Sending account; first of `eth_accounts` when unset
    pub from: Option<String>,
    pub read_selector: [u8; 4],
    pub write_selector: [u8; 4],
    pub request_timeout: Duration,
    /// Delay between transaction lookups
    pub poll_interval: Duration,
    /// Lookups before a sent transaction counts as lost
    pub accept_attempts: u32,
}

impl RpcConfig {
    pub fn new(endpoint: impl Into<String>, contract: impl Into<String>) -> Self {
        RpcConfig {
            endpoint: endpoint.into(),
            contract: contract.into(),
            from: None,
            read_selector: GET_MESSAGE_SELECTOR,
            write_selector: SET_MESSAGE_SELECTOR,
            request_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(2),
            accept_attempts: 30,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Json>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Json>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptObject {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

struct Transport {
    client: Client,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl Transport {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Json,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(method, id, "rpc request");
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response.json().await?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        serde_json::from_value(envelope.result.unwrap_or(Json::Null)).map_err(|e| {
            RpcError::Decode {
                method,
                reason: e.to_string(),
            }
        })
    }

    async fn sender(&self) -> Result<String, RpcError> {
        if let Some(from) = &self.config.from {
            return Ok(from.clone());
        }
        let accounts: Vec<String> = self.call("eth_accounts", json!([])).await?;
        accounts.into_iter().next().ok_or(RpcError::NoAccount)
    }
}

/// Ledger client for a message-board contract behind a JSON-RPC node
#[derive(Clone)]
pub struct RpcLedger {
    transport: Arc<Transport>,
}

impl RpcLedger {
    pub fn new(config: RpcConfig) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(RpcLedger {
            transport: Arc::new(Transport {
                client,
                config,
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.transport.config
    }

    async fn read_message(&self) -> Result<String, RpcError> {
        let t = &self.transport;
        let call = json!({
            "to": t.config.contract,
            "data": encode_call(t.config.read_selector),
        });
        let data: String = t.call("eth_call", json!([call, "latest"])).await?;
        Ok(decode_string(&data)?)
    }

    async fn send_message(&self, payload: &str) -> Result<RpcHandle, RpcError> {
        let t = &self.transport;
        let from = t.sender().await?;
        let tx = json!({
            "from": from,
            "to": t.config.contract,
            "data": encode_string_call(t.config.write_selector, payload),
        });
        let hash: String = t.call("eth_sendTransaction", json!([tx])).await?;
        tracing::info!(%hash, %from, "transaction sent");

        Ok(RpcHandle {
            hash,
            transport: Arc::clone(t),
        })
    }
}

impl LedgerClient for RpcLedger {
    type Handle = RpcHandle;

    async fn read(&self) -> Result<String, RawError> {
        Ok(self.read_message().await?)
    }

    async fn write(&self, payload: &str) -> Result<RpcHandle, RawError> {
        Ok(self.send_message(payload).await?)
    }
}

/// A sent transaction, identified by its hash
pub struct RpcHandle {
    hash: String,
    transport: Arc<Transport>,
}

impl RpcHandle {
    async fn wait_seen(&self) -> Result<(), RpcError> {
        let t = &self.transport;
        for attempt in 0..t.config.accept_attempts {
            if attempt > 0 {
                tokio::time::sleep(t.config.poll_interval).await;
            }
            let tx: Option<Json> = t
                .call("eth_getTransactionByHash", json!([self.hash]))
                .await?;
            if tx.is_some() {
                return Ok(());
            }
        }
        Err(RpcError::NotSeen(self.hash.clone()))
    }

    async fn wait_receipt(&self) -> Result<Receipt, RpcError> {
        let t = &self.transport;
        loop {
            let receipt: Option<ReceiptObject> = t
                .call("eth_getTransactionReceipt", json!([self.hash]))
                .await?;

            if let Some(receipt) = receipt {
                if receipt.status.as_deref() == Some("0x0") {
                    return Err(RpcError::Reverted(self.hash.clone()));
                }
                let block = receipt.block_number.as_deref().and_then(parse_quantity);
                return Ok(Receipt {
                    handle: self.hash.clone(),
                    block,
                });
            }

            tokio::time::sleep(t.config.poll_interval).await;
        }
    }
}

impl TransactionHandle for RpcHandle {
    fn id(&self) -> String {
        self.hash.clone()
    }

    async fn accepted(&mut self) -> Result<(), RawError> {
        Ok(self.wait_seen().await?)
    }

    async fn wait(self) -> Result<Receipt, RawError> {
        Ok(self.wait_receipt().await?)
    }
}

/// Parse a hex quantity such as `0x1b4`
fn parse_quantity(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x")?;
    u64::from_str_radix(digits, 16).ok()
}
