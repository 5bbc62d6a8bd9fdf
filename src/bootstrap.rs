use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::coordinator::ReconciliationCoordinator;
use crate::error::AppResult;
use crate::execution::PaymentDispatcher;
use crate::ledger::{JsonFileStore, TransactionLedger};
use crate::oracle::PriceOracleClient;
use crate::persistence::{RecordStore, RestRecordStore};
use crate::pool::PoolAccountingService;
use crate::provider::{HttpRpcProvider, WalletProvider};
use crate::trust::TrustScoreClient;
use crate::wallet::{self, WalletSession};

/// Initialize logging and tracing
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,paylend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Fully wired application core.
pub struct AppCore {
    pub config: Config,
    pub session: WalletSession,
    pub ledger: Arc<TransactionLedger>,
    pub oracle: PriceOracleClient,
    pub coordinator: Arc<ReconciliationCoordinator>,
}

impl AppCore {
    /// Wire every component against an injected wallet provider. Hosts
    /// embedding a browser wallet pass their own [`WalletProvider`]; headless
    /// use goes through [`connect_rpc`].
    pub async fn initialize(
        config: Config,
        provider: Arc<dyn WalletProvider>,
    ) -> AppResult<Self> {
        info!("Initializing application components ...");

        let session = wallet::connect(provider, &config.network).await?;
        info!("✅ Wallet session established on {}", config.network.chain_name);

        let ledger = Arc::new(
            TransactionLedger::open(Arc::new(JsonFileStore::new(&config.tx_history_path))).await?,
        );
        info!(
            "✅ Transaction ledger loaded ({} entries)",
            ledger.history().len()
        );

        let oracle = PriceOracleClient::new(&config.price_api_url, &config.price_symbol);

        let records: Arc<dyn RecordStore> = Arc::new(RestRecordStore::new(
            &config.record_store_url,
            &config.record_store_api_key,
        )?);

        let dispatcher = PaymentDispatcher::new(session.clone());
        let pool = PoolAccountingService::new(session.clone(), &config.pool_address)?;
        let trust = TrustScoreClient::new(session.clone(), &config.trust_score_address)?;

        let coordinator = Arc::new(
            ReconciliationCoordinator::new(
                session.clone(),
                dispatcher,
                pool,
                ledger.clone(),
                records,
            )
            .with_trust_client(trust),
        );

        info!("✅ Application core initialized");
        Ok(Self {
            config,
            session,
            ledger,
            oracle,
            coordinator,
        })
    }

    /// Convenience wiring over the crate's own JSON-RPC provider against the
    /// configured primary endpoint.
    pub async fn connect_rpc(config: Config) -> AppResult<Self> {
        dotenv::dotenv().ok();
        let provider = Arc::new(HttpRpcProvider::new(config.network.primary_rpc_url()));
        Self::initialize(config, provider).await
    }

    /// Cancel in-flight confirmation polls before dropping the core.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}
