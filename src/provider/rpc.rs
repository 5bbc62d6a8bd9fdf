use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RpcError;
use crate::provider::WalletProvider;

const RPC_TIMEOUT: Duration = Duration::from_secs(20);

/// JSON-RPC over HTTPS against a configured endpoint.
///
/// Only the primary RPC URL is dialed; configured alternates are not failed
/// over to. Wallet-only methods (`wallet_*`, `eth_requestAccounts`) reach the
/// same endpoint and surface whatever the node answers, which for a public
/// endpoint is a provider error — the injected wallet provider handles those
/// in a real deployment.
pub struct HttpRpcProvider {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpRpcProvider {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl WalletProvider for HttpRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout
                } else {
                    RpcError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RpcError::Transient(format!("HTTP {status}")));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| RpcError::MalformedResponse(e.to_string()))?;

        if let Some(error) = envelope.get("error") {
            return Err(RpcError::Provider {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown provider error")
                    .to_string(),
                data: error.get("data").cloned(),
            });
        }

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::MalformedResponse("missing result field".into()))
    }
}
