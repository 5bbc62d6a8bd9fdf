use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppResult, ContractError};
use crate::execution::{
    CancelToken, PaymentDispatcher, PaymentRequest, PollPolicy, TransactionResult,
    TransactionTracker,
};
use crate::ledger::{Currency, TransactionLedger, TransactionRecord, TxKind, TxStatus};
use crate::persistence::{InvestmentRow, InvestmentTransactionRow, PoolSnapshotRow, RecordStore};
use crate::pool::{Investment, InvestmentStatus, PoolAccountingService};
use crate::trust::TrustScoreClient;
use crate::wallet::WalletSession;

/// Default investment term used for the off-chain maturity date.
const INVESTMENT_TERM_DAYS: i64 = 365;

/// Views that need re-fetching after a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshEvent {
    Businesses,
    Campaigns,
    Pool,
}

/// Sequences every money-moving flow end to end: submit the chain call, append
/// a pending ledger entry, run the bounded confirmation poll, settle the ledger
/// status, then mirror into the off-chain store.
///
/// The chain is the source of truth. A persistence failure after an on-chain
/// success surfaces as [`AppError::Persistence`] and never touches the already
/// settled ledger entry; callers decide how to reconcile.
pub struct ReconciliationCoordinator {
    session: WalletSession,
    dispatcher: PaymentDispatcher,
    pool: PoolAccountingService,
    ledger: Arc<TransactionLedger>,
    records: Arc<dyn RecordStore>,
    trust: Option<TrustScoreClient>,
    tracker: TransactionTracker,
    poll_policy: PollPolicy,
    cancel: CancelToken,
    refresh: broadcast::Sender<RefreshEvent>,
}

impl ReconciliationCoordinator {
    pub fn new(
        session: WalletSession,
        dispatcher: PaymentDispatcher,
        pool: PoolAccountingService,
        ledger: Arc<TransactionLedger>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let tracker = TransactionTracker::new(session.provider.clone());
        let (refresh, _) = broadcast::channel(16);
        Self {
            session,
            dispatcher,
            pool,
            ledger,
            records,
            trust: None,
            tracker,
            poll_policy: PollPolicy::default(),
            cancel: CancelToken::new(),
            refresh,
        }
    }

    pub fn with_trust_client(mut self, trust: TrustScoreClient) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Listen for refresh fan-out. Each successful mutation broadcasts the
    /// views it invalidated.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.refresh.subscribe()
    }

    /// Token shared by every poll this coordinator runs; cancelling it stops
    /// in-flight confirmation waits without touching submitted transactions.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Send a payment and settle its ledger entry. The pending entry is
    /// appended as soon as the hash exists, so a crash mid-poll still leaves a
    /// traceable record.
    pub async fn send_payment(&self, request: &PaymentRequest) -> TransactionResult {
        let tx_hash = match self.dispatcher.submit(request).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("payment rejected before submission: {}", e);
                return TransactionResult::failed(e.to_string(), None);
            }
        };

        let mut record = TransactionRecord::pending(
            tx_hash.clone(),
            TxKind::Payment,
            request.amount,
            request.currency.clone(),
        );
        record.deal_id = request.deal_id.clone();
        record.business_id = request.business_id.clone();
        self.append_to_ledger(record).await;

        let result = self.settle(&tx_hash).await;
        if result.success {
            self.record_trust_interaction("payment").await;
            self.notify_all();
        }
        result
    }

    /// Invest native currency into the pool and mirror the confirmed position
    /// off chain. Returns the off-chain investment record.
    pub async fn invest_in_pool(&self, amount: Decimal) -> AppResult<Investment> {
        let tx_hash = self.pool.invest_in_pool(amount).await?;

        self.append_to_ledger(TransactionRecord::pending(
            tx_hash.clone(),
            TxKind::Investment,
            amount,
            Currency::Native,
        ))
        .await;

        let result = self.settle(&tx_hash).await;
        if !result.success {
            return Err(ContractError::Revert(
                result
                    .error
                    .unwrap_or_else(|| "pool investment did not confirm".to_string()),
            )
            .into());
        }

        // Reads degrade to zero aggregates, so a flaky snapshot never blocks
        // the mirror write.
        let snapshot = self.pool.pool_snapshot().await?;
        let investment = Investment {
            id: Uuid::new_v4(),
            investor: self.session.address.clone(),
            amount,
            apy: snapshot.current_apy,
            maturity_date: Utc::now() + ChronoDuration::days(INVESTMENT_TERM_DAYS),
            earned_interest: Decimal::ZERO,
            status: InvestmentStatus::Active,
        };

        self.records
            .insert_investment(&InvestmentRow::from_investment(&investment))
            .await?;
        self.records
            .insert_investment_transaction(&InvestmentTransactionRow::new(
                investment.id,
                &tx_hash,
                "invest",
                amount,
            ))
            .await?;

        self.notify_all();
        info!("pool investment reconciled: {} ({})", amount, tx_hash);
        Ok(investment)
    }

    /// Submit a borrower application and await its confirmation. Applications
    /// carry no value and keep no off-chain mirror.
    pub async fn apply_for_loan(
        &self,
        amount: Decimal,
        purpose: &str,
        daily_repayment_pct: Decimal,
    ) -> TransactionResult {
        let tx_hash = match self
            .pool
            .apply_for_loan(amount, purpose, daily_repayment_pct)
            .await
        {
            Ok(hash) => hash,
            Err(e) => return TransactionResult::failed(e.to_string(), None),
        };

        let result = self.await_receipt(&tx_hash).await;
        if result.success {
            self.notify_all();
        }
        result
    }

    /// Fund part of a pending loan.
    pub async fn fund_loan(&self, loan_id: u64, amount: Decimal) -> TransactionResult {
        let tx_hash = match self.pool.invest_in_loan(loan_id, amount).await {
            Ok(hash) => hash,
            Err(e) => return TransactionResult::failed(e.to_string(), None),
        };

        self.append_to_ledger(TransactionRecord::pending(
            tx_hash.clone(),
            TxKind::Investment,
            amount,
            Currency::Native,
        ))
        .await;

        let result = self.settle(&tx_hash).await;
        if result.success {
            self.notify_all();
        }
        result
    }

    /// Repay against a loan.
    pub async fn repay_loan(&self, loan_id: u64, amount: Decimal) -> TransactionResult {
        let tx_hash = match self.pool.repay_loan(loan_id, amount).await {
            Ok(hash) => hash,
            Err(e) => return TransactionResult::failed(e.to_string(), None),
        };

        self.append_to_ledger(TransactionRecord::pending(
            tx_hash.clone(),
            TxKind::Payment,
            amount,
            Currency::Native,
        ))
        .await;

        let result = self.settle(&tx_hash).await;
        if result.success {
            self.record_trust_interaction("repayment").await;
            self.notify_all();
        }
        result
    }

    /// Snapshot the pool aggregates into the off-chain statistics table.
    pub async fn record_pool_snapshot(&self) -> AppResult<()> {
        let snapshot = self.pool.pool_snapshot().await?;
        let row = PoolSnapshotRow {
            id: Uuid::new_v4(),
            total_invested: snapshot.total_invested,
            total_borrowed: snapshot.total_borrowed,
            available_liquidity: snapshot.available_liquidity,
            utilization_rate: snapshot.utilization_rate,
            current_apy: snapshot.current_apy,
            total_investors: snapshot.total_investors,
            recorded_at: Utc::now(),
        };
        self.records.insert_pool_snapshot(&row).await
    }

    /// Poll to a terminal status and settle the matching ledger entry. Timeout
    /// and cancellation leave the entry pending; it can be settled on a later
    /// status check.
    async fn settle(&self, tx_hash: &str) -> TransactionResult {
        match self
            .tracker
            .poll_until_terminal(tx_hash, self.poll_policy, &self.cancel)
            .await
        {
            Ok(report) => {
                if let Err(e) = self.ledger.update_status(tx_hash, report.status).await {
                    warn!("ledger update for {} failed: {}", tx_hash, e);
                }
                if report.status == TxStatus::Confirmed {
                    TransactionResult::confirmed(tx_hash.to_string(), report.gas_used)
                } else {
                    TransactionResult::failed(
                        "Transaction reverted on-chain",
                        Some(tx_hash.to_string()),
                    )
                }
            }
            Err(e) => TransactionResult::failed(e.to_string(), Some(tx_hash.to_string())),
        }
    }

    async fn await_receipt(&self, tx_hash: &str) -> TransactionResult {
        match self
            .tracker
            .poll_until_terminal(tx_hash, self.poll_policy, &self.cancel)
            .await
        {
            Ok(report) if report.status == TxStatus::Confirmed => {
                TransactionResult::confirmed(tx_hash.to_string(), report.gas_used)
            }
            Ok(_) => {
                TransactionResult::failed("Transaction reverted on-chain", Some(tx_hash.to_string()))
            }
            Err(e) => TransactionResult::failed(e.to_string(), Some(tx_hash.to_string())),
        }
    }

    /// History writes never block a chain flow already in flight.
    async fn append_to_ledger(&self, record: TransactionRecord) {
        if let Err(e) = self.ledger.append(record).await {
            warn!("ledger append failed: {}", e);
        }
    }

    /// Trust interactions are best effort; the score contract lagging a
    /// payment is acceptable.
    async fn record_trust_interaction(&self, kind: &str) {
        if let Some(trust) = &self.trust {
            if let Err(e) = trust.record_interaction(kind).await {
                warn!("trust interaction '{}' not recorded: {}", kind, e);
            }
        }
    }

    /// Every successful mutation invalidates the business, campaign, and pool
    /// views; subscribers re-fetch all three.
    fn notify_all(&self) {
        for event in [
            RefreshEvent::Businesses,
            RefreshEvent::Campaigns,
            RefreshEvent::Pool,
        ] {
            // No subscribers is fine; fan-out is advisory.
            let _ = self.refresh.send(event);
        }
    }
}

impl Drop for ReconciliationCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
