use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::config::NetworkDescriptor;
use crate::error::{
    AppError, AppResult, RpcError, WalletError, CODE_UNRECOGNIZED_CHAIN, CODE_USER_REJECTED,
};
use crate::provider::WalletProvider;

/// Active wallet session. Created on connect, discarded on disconnect or
/// account change; never persisted.
#[derive(Clone)]
pub struct WalletSession {
    pub address: String,
    pub chain_id: u64,
    pub provider: Arc<dyn WalletProvider>,
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Attaches the wallet session to the target chain, switching or registering
/// the network definition as needed.
pub struct NetworkNegotiator {
    provider: Arc<dyn WalletProvider>,
}

impl NetworkNegotiator {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self { provider }
    }

    /// Ensure the wallet is on `target`. Side effect: may prompt the user via
    /// the wallet UI. A declined switch terminates the connect flow; it is
    /// never retried here.
    pub async fn ensure_network(&self, target: &NetworkDescriptor) -> AppResult<()> {
        let current = self.provider.chain_id().await?;
        if current == target.chain_id {
            return Ok(());
        }

        info!(
            "wallet on chain {}, switching to {} ({})",
            current, target.chain_id, target.chain_name
        );

        let switch = self
            .provider
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": target.chain_id_hex() }]),
            )
            .await;

        match switch {
            Ok(_) => {}
            Err(RpcError::Provider { code, .. }) if code == CODE_UNRECOGNIZED_CHAIN => {
                // The wallet has never seen this chain; register the full
                // descriptor. The add flow switches implicitly on success.
                self.add_chain(target).await?;
            }
            Err(RpcError::Provider { code, .. }) if code == CODE_USER_REJECTED => {
                return Err(WalletError::Rejected.into());
            }
            Err(e) => return Err(WalletError::SwitchFailed(e.to_string()).into()),
        }

        // Some wallets acknowledge the switch request without performing it;
        // re-read the chain before handing out a session.
        let now = self.provider.chain_id().await?;
        if now != target.chain_id {
            return Err(WalletError::NetworkMismatch {
                expected: target.chain_id,
                actual: now,
            }
            .into());
        }
        Ok(())
    }

    async fn add_chain(&self, target: &NetworkDescriptor) -> AppResult<()> {
        let params = json!([{
            "chainId": target.chain_id_hex(),
            "chainName": target.chain_name,
            "nativeCurrency": {
                "name": target.native_currency.name,
                "symbol": target.native_currency.symbol,
                "decimals": target.native_currency.decimals,
            },
            "rpcUrls": target.rpc_urls,
            "blockExplorerUrls": target.explorer_urls,
        }]);

        self.provider
            .request("wallet_addEthereumChain", params)
            .await
            .map_err(|e| match e {
                RpcError::Provider { code, .. } if code == CODE_USER_REJECTED => {
                    AppError::Wallet(WalletError::Rejected)
                }
                other => AppError::Wallet(WalletError::SwitchFailed(other.to_string())),
            })?;

        info!("registered network {} with the wallet", target.chain_name);
        Ok(())
    }
}

/// Connect flow: negotiate the target network, then request an account.
pub async fn connect(
    provider: Arc<dyn WalletProvider>,
    target: &NetworkDescriptor,
) -> AppResult<WalletSession> {
    let negotiator = NetworkNegotiator::new(provider.clone());
    negotiator.ensure_network(target).await?;

    let accounts = provider.request_accounts().await.map_err(|e| {
        if e.is_user_rejection() {
            AppError::Wallet(WalletError::Rejected)
        } else {
            e
        }
    })?;

    let session = WalletSession {
        address: accounts[0].clone(),
        chain_id: target.chain_id,
        provider,
    };
    info!("wallet connected: {}", session.address);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NativeCurrency;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};

    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn script(&self, method: &str, response: Result<Value, RpcError>) {
            self.responses
                .lock()
                .entry(method.to_string())
                .or_default()
                .push_back(response);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl WalletProvider for ScriptedProvider {
        async fn request(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
            self.calls.lock().push(method.to_string());
            self.responses
                .lock()
                .get_mut(method)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| panic!("unscripted method: {method}"))
        }
    }

    fn testnet() -> NetworkDescriptor {
        NetworkDescriptor {
            chain_id: 1001,
            chain_name: "Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "KAIA".to_string(),
                symbol: "KAIA".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["http://localhost:8545".to_string()],
            explorer_urls: vec![],
        }
    }

    #[tokio::test]
    async fn matching_chain_is_a_no_op() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_chainId", Ok(Value::String("0x3e9".into())));

        let negotiator = NetworkNegotiator::new(provider.clone());
        negotiator.ensure_network(&testnet()).await.unwrap();
        assert_eq!(provider.calls(), vec!["eth_chainId"]);
    }

    #[tokio::test]
    async fn mismatch_switches_chain() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_chainId", Ok(Value::String("0x1".into())));
        provider.script("wallet_switchEthereumChain", Ok(Value::Null));
        provider.script("eth_chainId", Ok(Value::String("0x3e9".into())));

        let negotiator = NetworkNegotiator::new(provider.clone());
        negotiator.ensure_network(&testnet()).await.unwrap();
        assert_eq!(
            provider.calls(),
            vec!["eth_chainId", "wallet_switchEthereumChain", "eth_chainId"]
        );
    }

    #[tokio::test]
    async fn acknowledged_switch_that_changes_nothing_is_a_mismatch() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_chainId", Ok(Value::String("0x1".into())));
        provider.script("wallet_switchEthereumChain", Ok(Value::Null));
        provider.script("eth_chainId", Ok(Value::String("0x1".into())));

        let negotiator = NetworkNegotiator::new(provider.clone());
        let err = negotiator.ensure_network(&testnet()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Wallet(WalletError::NetworkMismatch {
                expected: 1001,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn unknown_chain_triggers_add_flow() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_chainId", Ok(Value::String("0x1".into())));
        provider.script(
            "wallet_switchEthereumChain",
            Err(RpcError::Provider {
                code: CODE_UNRECOGNIZED_CHAIN,
                message: "Unrecognized chain ID".into(),
                data: None,
            }),
        );
        provider.script("wallet_addEthereumChain", Ok(Value::Null));
        provider.script("eth_chainId", Ok(Value::String("0x3e9".into())));

        let negotiator = NetworkNegotiator::new(provider.clone());
        negotiator.ensure_network(&testnet()).await.unwrap();
        assert_eq!(
            provider.calls(),
            vec![
                "eth_chainId",
                "wallet_switchEthereumChain",
                "wallet_addEthereumChain",
                "eth_chainId"
            ]
        );
    }

    #[tokio::test]
    async fn user_rejection_is_fatal() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_chainId", Ok(Value::String("0x1".into())));
        provider.script(
            "wallet_switchEthereumChain",
            Err(RpcError::Provider {
                code: CODE_USER_REJECTED,
                message: "User rejected the request".into(),
                data: None,
            }),
        );

        let negotiator = NetworkNegotiator::new(provider.clone());
        let err = negotiator.ensure_network(&testnet()).await.unwrap_err();
        assert!(err.is_user_rejection());
    }

    #[tokio::test]
    async fn other_switch_failures_are_fatal() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.script("eth_chainId", Ok(Value::String("0x1".into())));
        provider.script(
            "wallet_switchEthereumChain",
            Err(RpcError::Transient("connection reset".into())),
        );

        let negotiator = NetworkNegotiator::new(provider.clone());
        let err = negotiator.ensure_network(&testnet()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Wallet(WalletError::SwitchFailed(_))
        ));
    }
}
