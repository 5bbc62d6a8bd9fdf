use serde::Deserialize;

/// Full network descriptor, carried verbatim in a `wallet_addEthereumChain`
/// request when the wallet does not know the target chain.
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    /// Primary RPC URL first. Alternates are declared but never dialed
    /// automatically; there is no failover between them.
    pub rpc_urls: Vec<String>,
    pub explorer_urls: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NetworkDescriptor {
    pub fn primary_rpc_url(&self) -> &str {
        self.rpc_urls
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Chain id in the 0x-prefixed hex form wallet_* methods expect.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkDescriptor,
    /// Lending pool contract address
    pub pool_address: String,
    /// Payment token contract address
    pub token_address: String,
    /// Trust score contract address
    pub trust_score_address: String,
    /// Price oracle endpoint, queried for the native currency USD price
    pub price_api_url: String,
    /// Asset id the price endpoint keys its response by
    pub price_symbol: String,
    /// Off-chain record store (REST) base URL
    pub record_store_url: String,
    pub record_store_api_key: String,
    /// Path of the persisted local transaction history
    pub tx_history_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let chain_id = std::env::var("CHAIN_ID")
            .unwrap_or_else(|_| "1001".to_string())
            .parse::<u64>()
            .map_err(|e| config::ConfigError::Message(format!("CHAIN_ID: {}", e)))?;

        let rpc_urls = std::env::var("RPC_URLS")
            .unwrap_or_else(|_| "https://public-en-kairos.node.kaia.io".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            network: NetworkDescriptor {
                chain_id,
                chain_name: std::env::var("CHAIN_NAME")
                    .unwrap_or_else(|_| "Kaia Kairos Testnet".to_string()),
                native_currency: NativeCurrency {
                    name: std::env::var("NATIVE_NAME").unwrap_or_else(|_| "KAIA".to_string()),
                    symbol: std::env::var("NATIVE_SYMBOL").unwrap_or_else(|_| "KAIA".to_string()),
                    decimals: 18,
                },
                rpc_urls,
                explorer_urls: vec![std::env::var("EXPLORER_URL")
                    .unwrap_or_else(|_| "https://kairos.kaiascan.io".to_string())],
            },
            pool_address: std::env::var("POOL_ADDRESS").unwrap_or_default(),
            token_address: std::env::var("TOKEN_ADDRESS").unwrap_or_default(),
            trust_score_address: std::env::var("TRUST_SCORE_ADDRESS").unwrap_or_default(),
            price_api_url: std::env::var("PRICE_API_URL").unwrap_or_else(|_| {
                "https://api.coingecko.com/api/v3/simple/price?ids=kaia&vs_currencies=usd"
                    .to_string()
            }),
            price_symbol: std::env::var("PRICE_SYMBOL").unwrap_or_else(|_| "kaia".to_string()),
            record_store_url: std::env::var("RECORD_STORE_URL").unwrap_or_default(),
            record_store_api_key: std::env::var("RECORD_STORE_API_KEY").unwrap_or_default(),
            tx_history_path: std::env::var("TX_HISTORY_PATH")
                .unwrap_or_else(|_| "paylend_tx_history.json".to_string()),
        })
    }
}
