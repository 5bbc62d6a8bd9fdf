pub mod rpc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AppResult, RpcError, WalletError};

pub use rpc::HttpRpcProvider;

/// EIP-1193 style transaction call object. `None` fields are omitted from the
/// serialized request so the wallet fills them in.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TxCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// The wallet/provider surface this core depends on.
///
/// Everything speaks through `request` so test doubles only have to script one
/// method; the typed helpers below are default implementations on top of it.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Raw `request(method, params)` pass-through. Provider error objects are
    /// surfaced as [`RpcError::Provider`] with their numeric code preserved.
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// `eth_chainId`, decoded from its hex form.
    async fn chain_id(&self) -> AppResult<u64> {
        let value = self.request("eth_chainId", json!([])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| RpcError::MalformedResponse("eth_chainId: not a string".into()))?;
        parse_hex_u64(hex)
            .ok_or_else(|| RpcError::MalformedResponse(format!("eth_chainId: {hex}")).into())
    }

    /// `eth_requestAccounts`; prompts the wallet if no session exists.
    async fn request_accounts(&self) -> AppResult<Vec<String>> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        let accounts: Vec<String> = serde_json::from_value(value)
            .map_err(|e| RpcError::MalformedResponse(format!("eth_requestAccounts: {e}")))?;
        if accounts.is_empty() {
            return Err(WalletError::NoAccount.into());
        }
        Ok(accounts)
    }

    /// `eth_sendTransaction` — signed by the wallet, returns the tx hash.
    async fn send_transaction(&self, call: &TxCall) -> AppResult<String> {
        let value = self
            .request("eth_sendTransaction", json!([call]))
            .await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| RpcError::MalformedResponse("eth_sendTransaction: no hash".into()).into())
    }

    /// `eth_call` against the latest block, returning the raw hex output.
    async fn call(&self, call: &TxCall) -> AppResult<String> {
        let value = self.request("eth_call", json!([call, "latest"])).await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| RpcError::MalformedResponse("eth_call: not a string".into()).into())
    }

    /// `eth_getTransactionReceipt`; `None` while the transaction is unmined.
    async fn transaction_receipt(&self, tx_hash: &str) -> AppResult<Option<Value>> {
        let value = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }
}

pub(crate) fn parse_hex_u64(hex: &str) -> Option<u64> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_call_omits_unset_fields() {
        let call = TxCall {
            to: "0xabc".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value, json!({"to": "0xabc"}));
    }

    #[test]
    fn parses_hex_chain_id() {
        assert_eq!(parse_hex_u64("0x3e9"), Some(1001));
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("nope"), None);
    }
}
