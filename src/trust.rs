use ethers::abi::Token;
use tracing::info;

use crate::contracts::{decode_uint, encode_call, parse_address};
use crate::error::AppResult;
use crate::provider::TxCall;
use crate::retry::read_with_retry;
use crate::wallet::WalletSession;

/// Thin surface over the trust-score contract: record an interaction, read a
/// score. Scoring logic lives on chain.
pub struct TrustScoreClient {
    session: WalletSession,
    contract: String,
}

impl TrustScoreClient {
    pub fn new(session: WalletSession, contract_address: &str) -> AppResult<Self> {
        let contract = parse_address(contract_address)?;
        Ok(Self {
            session,
            contract: format!("{contract:#x}"),
        })
    }

    pub async fn record_interaction(&self, kind: &str) -> AppResult<String> {
        let call = TxCall {
            from: Some(self.session.address.clone()),
            to: self.contract.clone(),
            value: None,
            gas: None,
            data: Some(encode_call(
                "recordInteraction(string)",
                &[Token::String(kind.to_string())],
            )),
        };

        let tx_hash = self.session.provider.send_transaction(&call).await?;
        info!("trust interaction recorded: {} ({})", kind, tx_hash);
        Ok(tx_hash)
    }

    /// Score read; degrades to zero on persistent read failure.
    pub async fn score_of(&self, address: &str) -> AppResult<u64> {
        let subject = parse_address(address)?;
        let call = TxCall {
            to: self.contract.clone(),
            data: Some(encode_call("scoreOf(address)", &[Token::Address(subject)])),
            ..Default::default()
        };

        let score = read_with_retry(
            || async {
                let output = self.session.provider.call(&call).await?;
                decode_uint(&output).map(|v| v.low_u64())
            },
            0,
        )
        .await;
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::selector;
    use crate::error::RpcError;
    use crate::provider::WalletProvider;
    use async_trait::async_trait;
    use ethers::abi::{self, Token as AbiToken};
    use ethers::types::U256;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    const CONTRACT: &str = "0x6666666666666666666666666666666666666666";
    const SENDER: &str = "0x3333333333333333333333333333333333333333";
    const SUBJECT: &str = "0x2222222222222222222222222222222222222222";

    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedProvider {
        fn script(&self, method: &str, response: Result<Value, RpcError>) {
            self.responses
                .lock()
                .entry(method.to_string())
                .or_default()
                .push_back(response);
        }

        fn calls_to(&self, method: &str) -> Vec<Value> {
            self.calls
                .lock()
                .iter()
                .filter(|(m, _)| m == method)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl WalletProvider for ScriptedProvider {
        async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
            self.calls.lock().push((method.to_string(), params));
            let mut responses = self.responses.lock();
            let queue = responses
                .get_mut(method)
                .unwrap_or_else(|| panic!("unscripted method: {method}"));
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            }
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> TrustScoreClient {
        let session = WalletSession {
            address: SENDER.to_string(),
            chain_id: 1001,
            provider,
        };
        TrustScoreClient::new(session, CONTRACT).unwrap()
    }

    #[tokio::test]
    async fn records_interaction_against_the_contract() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_sendTransaction", Ok(json!("0xtrust1")));

        let hash = client(provider.clone())
            .record_interaction("payment")
            .await
            .unwrap();
        assert_eq!(hash, "0xtrust1");

        let call = &provider.calls_to("eth_sendTransaction")[0][0];
        assert_eq!(call["to"], CONTRACT);
        let expected = format!("0x{}", hex::encode(selector("recordInteraction(string)")));
        assert!(call["data"].as_str().unwrap().starts_with(&expected));
    }

    #[tokio::test]
    async fn reads_the_score_of_an_address() {
        let provider = Arc::new(ScriptedProvider::default());
        let encoded = format!(
            "0x{}",
            hex::encode(abi::encode(&[AbiToken::Uint(U256::from(42u8))]))
        );
        provider.script("eth_call", Ok(json!(encoded)));

        let score = client(provider).score_of(SUBJECT).await.unwrap();
        assert_eq!(score, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn score_degrades_to_zero_when_the_read_keeps_failing() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_call", Err(RpcError::Transient("node down".into())));

        let score = client(provider.clone()).score_of(SUBJECT).await.unwrap();
        assert_eq!(score, 0);
        assert_eq!(provider.calls_to("eth_call").len(), 3);
    }

    #[tokio::test]
    async fn rejects_a_malformed_contract_address() {
        let session = WalletSession {
            address: SENDER.to_string(),
            chain_id: 1001,
            provider: Arc::new(ScriptedProvider::default()),
        };
        assert!(TrustScoreClient::new(session, "0xnope").is_err());
    }
}
