use ethers::abi::Token;
use ethers::types::U256;
use ethers::utils::format_units;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contracts::{
    decode_uint, encode_call, parse_address, revert_reason, scale_amount, u256_to_hex,
};
use crate::error::{AppError, AppResult, RpcError};
use crate::execution::tracker::{CancelToken, PollPolicy, TransactionTracker};
use crate::ledger::{Currency, TxStatus};
use crate::provider::TxCall;
use crate::retry::read_with_retry;
use crate::wallet::WalletSession;

/// Gas limit for a plain native value transfer.
const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// One attempted payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub recipient: String,
    /// Decimal-string amount in display units, e.g. "10.00".
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
}

/// Outcome of a money-moving call. Errors never escape as panics or raw
/// provider failures; callers render `error` inline.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionResult {
    pub fn confirmed(tx_hash: String, gas_used: Option<u64>) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            gas_used,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, tx_hash: Option<String>) -> Self {
        Self {
            success: false,
            tx_hash,
            gas_used: None,
            error: Some(error.into()),
        }
    }
}

/// Executes payments in either the native currency or a token contract
/// currency. Exactly one encoding path per request.
pub struct PaymentDispatcher {
    session: WalletSession,
    tracker: TransactionTracker,
    poll_policy: PollPolicy,
}

impl PaymentDispatcher {
    pub fn new(session: WalletSession) -> Self {
        let tracker = TransactionTracker::new(session.provider.clone());
        Self {
            session,
            tracker,
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Precheck and submit, returning the transaction hash without awaiting
    /// the receipt. The coordinator uses this to interleave ledger appends
    /// with the confirmation poll.
    pub async fn submit(&self, request: &PaymentRequest) -> AppResult<String> {
        let recipient = parse_address(&request.recipient)?;
        if request.amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "payment amount must be positive, got {}",
                request.amount
            )));
        }

        let call = match &request.currency {
            Currency::Native => {
                let value = scale_amount(&request.amount.to_string(), 18)?;
                TxCall {
                    from: Some(self.session.address.clone()),
                    to: format!("{recipient:#x}"),
                    value: Some(u256_to_hex(value)),
                    gas: Some(u256_to_hex(U256::from(NATIVE_TRANSFER_GAS))),
                    data: None,
                }
            }
            Currency::Token { address } => {
                let token = parse_address(address)?;
                let sender = parse_address(&self.session.address)?;
                let token_hex = format!("{token:#x}");
                let decimals = self.token_decimals(&token_hex).await?;
                let scaled = scale_amount(&request.amount.to_string(), decimals)?;

                // Balance precheck happens before any signed call.
                let balance = self.token_balance(&token_hex, sender).await;
                if balance < scaled {
                    return Err(AppError::InsufficientFunds {
                        asset: "token".to_string(),
                        required: request.amount.to_string(),
                        available: format_units(balance, decimals)
                            .unwrap_or_else(|_| "0".to_string()),
                    });
                }

                let data = encode_call(
                    "transfer(address,uint256)",
                    &[Token::Address(recipient), Token::Uint(scaled)],
                );
                TxCall {
                    from: Some(self.session.address.clone()),
                    to: token_hex,
                    value: None,
                    gas: None,
                    data: Some(data),
                }
            }
        };

        let tx_hash = self
            .session
            .provider
            .send_transaction(&call)
            .await
            .map_err(map_send_error)?;

        info!(
            "{} payment submitted: {} -> {} ({})",
            request.currency, request.amount, request.recipient, tx_hash
        );
        Ok(tx_hash)
    }

    /// Full dispatch: precheck, submit, await the receipt. Never propagates an
    /// error past this boundary.
    pub async fn dispatch(&self, request: &PaymentRequest, cancel: &CancelToken) -> TransactionResult {
        let tx_hash = match self.submit(request).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("payment rejected before submission: {}", e);
                return TransactionResult::failed(e.to_string(), None);
            }
        };

        match self
            .tracker
            .poll_until_terminal(&tx_hash, self.poll_policy, cancel)
            .await
        {
            Ok(report) if report.status == TxStatus::Confirmed => {
                TransactionResult::confirmed(tx_hash, report.gas_used)
            }
            Ok(_) => TransactionResult::failed("Transaction reverted on-chain", Some(tx_hash)),
            Err(e) => TransactionResult::failed(e.to_string(), Some(tx_hash)),
        }
    }

    async fn token_decimals(&self, token: &str) -> AppResult<u32> {
        let call = TxCall {
            to: token.to_string(),
            data: Some(encode_call("decimals()", &[])),
            ..Default::default()
        };
        let output = self.session.provider.call(&call).await?;
        Ok(decode_uint(&output)?.low_u32())
    }

    /// Balance read through the bounded-retry reader; degrades to zero, which
    /// the precheck then rejects for any positive amount.
    async fn token_balance(&self, token: &str, owner: ethers::types::Address) -> U256 {
        let call = TxCall {
            to: token.to_string(),
            data: Some(encode_call("balanceOf(address)", &[Token::Address(owner)])),
            ..Default::default()
        };

        read_with_retry(
            || async {
                let output = self.session.provider.call(&call).await?;
                decode_uint(&output)
            },
            U256::zero(),
        )
        .await
    }
}

/// Decoded reverts surface as readable contract errors; everything else keeps
/// its transport error.
fn map_send_error(error: AppError) -> AppError {
    match &error {
        AppError::Rpc(rpc @ RpcError::Provider { .. }) => {
            if let Some(reason) = revert_reason(rpc) {
                return crate::error::ContractError::Revert(reason).into();
            }
            error
        }
        _ => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WalletProvider;
    use async_trait::async_trait;
    use ethers::abi;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";
    const SENDER: &str = "0x3333333333333333333333333333333333333333";
    const TOKEN: &str = "0x4444444444444444444444444444444444444444";

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
            self.responses
                .lock()
                .get_mut(method)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| panic!("unscripted method: {method}"))
        }
    }

    fn uint_hex(value: u64) -> String {
        format!(
            "0x{}",
            hex::encode(abi::encode(&[abi::Token::Uint(U256::from(value))]))
        )
    }

    fn dispatcher(provider: Arc<ScriptedProvider>) -> PaymentDispatcher {
        let session = WalletSession {
            address: SENDER.to_string(),
            chain_id: 1001,
            provider,
        };
        PaymentDispatcher::new(session).with_poll_policy(PollPolicy {
            interval: std::time::Duration::from_millis(5),
            max_attempts: 5,
        })
    }

    #[tokio::test]
    async fn native_payment_sends_value_with_fixed_gas() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_sendTransaction", Ok(json!("0xhash1")));

        let request = PaymentRequest {
            recipient: RECIPIENT.to_string(),
            amount: dec!(10.00),
            currency: Currency::Native,
            deal_id: None,
            business_id: None,
        };

        let hash = dispatcher(provider.clone()).submit(&request).await.unwrap();
        assert_eq!(hash, "0xhash1");

        let sends = provider.calls_to("eth_sendTransaction");
        let call = &sends[0][0];
        assert_eq!(call["to"], RECIPIENT);
        assert_eq!(call["value"], "0x8ac7230489e80000"); // 10 * 10^18
        assert_eq!(call["gas"], "0x5208");
        assert!(call.get("data").is_none());
    }

    #[tokio::test]
    async fn token_payment_over_balance_never_submits() {
        let provider = Arc::new(ScriptedProvider::default());
        // decimals() then balanceOf()
        provider.script("eth_call", Ok(json!(uint_hex(6))));
        provider.script("eth_call", Ok(json!(uint_hex(400_000_000)))); // 400 units

        let request = PaymentRequest {
            recipient: RECIPIENT.to_string(),
            amount: dec!(500),
            currency: Currency::Token {
                address: TOKEN.to_string(),
            },
            deal_id: None,
            business_id: None,
        };

        let result = dispatcher(provider.clone())
            .dispatch(&request, &CancelToken::new())
            .await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("Insufficient"));
        assert!(result.error.as_deref().unwrap().contains("balance"));
        assert!(provider.calls_to("eth_sendTransaction").is_empty());
    }

    #[tokio::test]
    async fn token_payment_scales_by_decimals_and_transfers() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_call", Ok(json!(uint_hex(6))));
        provider.script("eth_call", Ok(json!(uint_hex(1_000_000_000))));
        provider.script("eth_sendTransaction", Ok(json!("0xhash2")));

        let request = PaymentRequest {
            recipient: RECIPIENT.to_string(),
            amount: dec!(2.5),
            currency: Currency::Token {
                address: TOKEN.to_string(),
            },
            deal_id: None,
            business_id: None,
        };

        let hash = dispatcher(provider.clone()).submit(&request).await.unwrap();
        assert_eq!(hash, "0xhash2");

        let sends = provider.calls_to("eth_sendTransaction");
        let call = &sends[0][0];
        assert_eq!(call["to"], TOKEN);
        assert!(call.get("value").is_none());
        let data = call["data"].as_str().unwrap();
        assert!(data.starts_with("0xa9059cbb"));
        // 2.5 * 10^6 = 2_500_000 = 0x2625a0, right-aligned in the second word
        assert!(data.ends_with("2625a0"));
    }

    #[tokio::test]
    async fn invalid_recipient_fails_without_any_provider_call() {
        let provider = Arc::new(ScriptedProvider::default());
        let request = PaymentRequest {
            recipient: "not-an-address".to_string(),
            amount: dec!(1),
            currency: Currency::Native,
            deal_id: None,
            business_id: None,
        };

        let result = dispatcher(provider.clone())
            .dispatch(&request, &CancelToken::new())
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("Invalid address"));
        assert!(provider.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn dispatch_confirms_after_two_polls() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_sendTransaction", Ok(json!("0xhash3")));
        provider.script("eth_getTransactionReceipt", Ok(Value::Null));
        provider.script("eth_getTransactionReceipt", Ok(Value::Null));
        provider.script(
            "eth_getTransactionReceipt",
            Ok(json!({"status": "0x1", "blockNumber": "0x20", "gasUsed": "0x5208"})),
        );

        let request = PaymentRequest {
            recipient: RECIPIENT.to_string(),
            amount: dec!(10.00),
            currency: Currency::Native,
            deal_id: None,
            business_id: None,
        };

        let result = dispatcher(provider)
            .dispatch(&request, &CancelToken::new())
            .await;
        assert!(result.success);
        assert_eq!(result.tx_hash.as_deref(), Some("0xhash3"));
        assert_eq!(result.gas_used, Some(21_000));
    }

    #[tokio::test]
    async fn bounded_polling_reports_timeout() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_sendTransaction", Ok(json!("0xhash4")));
        for _ in 0..5 {
            provider.script("eth_getTransactionReceipt", Ok(Value::Null));
        }

        let request = PaymentRequest {
            recipient: RECIPIENT.to_string(),
            amount: dec!(1),
            currency: Currency::Native,
            deal_id: None,
            business_id: None,
        };

        let result = dispatcher(provider)
            .dispatch(&request, &CancelToken::new())
            .await;
        assert!(!result.success);
        assert_eq!(result.tx_hash.as_deref(), Some("0xhash4"));
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }
}
