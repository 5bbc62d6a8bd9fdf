use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::pool::{Investment, InvestmentStatus};

/// Row written to the off-chain store when a pool investment confirms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentRow {
    pub id: Uuid,
    pub investor_address: String,
    pub amount: Decimal,
    pub apy: Decimal,
    pub maturity_date: DateTime<Utc>,
    pub earned_interest: Decimal,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
}

impl InvestmentRow {
    pub fn from_investment(investment: &Investment) -> Self {
        Self {
            id: investment.id,
            investor_address: investment.investor.clone(),
            amount: investment.amount,
            apy: investment.apy,
            maturity_date: investment.maturity_date,
            earned_interest: investment.earned_interest,
            status: investment.status,
            created_at: Utc::now(),
        }
    }
}

/// Row linking an investment to the chain transaction that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentTransactionRow {
    pub id: Uuid,
    pub investment_id: Uuid,
    pub tx_hash: String,
    pub kind: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl InvestmentTransactionRow {
    pub fn new(investment_id: Uuid, tx_hash: &str, kind: &str, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            investment_id,
            tx_hash: tx_hash.to_string(),
            kind: kind.to_string(),
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Periodic pool-level aggregate, recorded for charting and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshotRow {
    pub id: Uuid,
    pub total_invested: Decimal,
    pub total_borrowed: Decimal,
    pub available_liquidity: Decimal,
    pub utilization_rate: Decimal,
    pub current_apy: Decimal,
    pub total_investors: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Off-chain relational store for investment records.
///
/// The chain stays the source of truth for balances; these rows exist so the
/// application can query history without walking contract storage. Failures
/// here never roll back a confirmed transaction.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_investment(&self, row: &InvestmentRow) -> AppResult<()>;
    async fn insert_investment_transaction(&self, row: &InvestmentTransactionRow) -> AppResult<()>;
    async fn insert_pool_snapshot(&self, row: &PoolSnapshotRow) -> AppResult<()>;
    async fn investments_for(&self, investor_address: &str) -> AppResult<Vec<InvestmentRow>>;
}

/// REST-backed store speaking the PostgREST dialect: one path per table,
/// `apikey` header auth, `eq.` filters on query strings.
pub struct RestRecordStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestRecordStore {
    pub fn new(base_url: &str, api_key: &str) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| AppError::Config("record store api key is not a valid header".into()))?;
        headers.insert("apikey", key);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| AppError::Config("record store api key is not a valid header".into()))?;
        bearer.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("record store client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn insert<T: Serialize>(&self, table: &str, row: &T) -> AppResult<()> {
        let url = format!("{}/{}", self.base_url, table);
        let response = self
            .client
            .post(&url)
            .json(row)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("insert into {table}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Persistence(format!(
                "insert into {table} failed: {status} {body}"
            )));
        }
        debug!("record store insert ok: {}", table);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn insert_investment(&self, row: &InvestmentRow) -> AppResult<()> {
        self.insert("investments", row).await
    }

    async fn insert_investment_transaction(&self, row: &InvestmentTransactionRow) -> AppResult<()> {
        self.insert("investment_transactions", row).await
    }

    async fn insert_pool_snapshot(&self, row: &PoolSnapshotRow) -> AppResult<()> {
        self.insert("pool_snapshots", row).await
    }

    async fn investments_for(&self, investor_address: &str) -> AppResult<Vec<InvestmentRow>> {
        let url = format!(
            "{}/investments?investor_address=eq.{}",
            self.base_url, investor_address
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Persistence(format!("query investments: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Persistence(format!(
                "query investments failed: {}",
                response.status()
            )));
        }

        response
            .json::<Vec<InvestmentRow>>()
            .await
            .map_err(|e| AppError::Persistence(format!("decode investments: {e}")))
    }
}

/// In-memory store for tests and offline development.
#[derive(Default)]
pub struct MemoryRecordStore {
    pub investments: Mutex<Vec<InvestmentRow>>,
    pub investment_transactions: Mutex<Vec<InvestmentTransactionRow>>,
    pub pool_snapshots: Mutex<Vec<PoolSnapshotRow>>,
    fail_inserts: std::sync::atomic::AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail, for divergence-path tests.
    pub fn fail_inserts(&self) {
        self.fail_inserts
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn check(&self, table: &str) -> AppResult<()> {
        if self.fail_inserts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::Persistence(format!(
                "insert into {table} failed: store offline"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_investment(&self, row: &InvestmentRow) -> AppResult<()> {
        self.check("investments")?;
        self.investments.lock().push(row.clone());
        Ok(())
    }

    async fn insert_investment_transaction(&self, row: &InvestmentTransactionRow) -> AppResult<()> {
        self.check("investment_transactions")?;
        self.investment_transactions.lock().push(row.clone());
        Ok(())
    }

    async fn insert_pool_snapshot(&self, row: &PoolSnapshotRow) -> AppResult<()> {
        self.check("pool_snapshots")?;
        self.pool_snapshots.lock().push(row.clone());
        Ok(())
    }

    async fn investments_for(&self, investor_address: &str) -> AppResult<Vec<InvestmentRow>> {
        Ok(self
            .investments
            .lock()
            .iter()
            .filter(|row| row.investor_address.eq_ignore_ascii_case(investor_address))
            .cloned()
            .collect())
    }
}
