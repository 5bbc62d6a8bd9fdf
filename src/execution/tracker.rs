use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::ledger::TxStatus;
use crate::provider::{parse_hex_u64, WalletProvider};

/// Cancellation handle tied to the owning component's lifetime. Dropping the
/// owner should call `cancel` so no poll loop outlives it.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                break;
            }
            notified.await;
        }
    }
}

/// Bounds on confirmation polling. The reviewed flow re-polled every 5s with
/// no bound; the bound and cancellation are deliberate additions.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Receipt-derived view of a submitted transaction.
#[derive(Debug, Clone)]
pub struct TxStatusReport {
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl TxStatusReport {
    fn pending() -> Self {
        Self {
            status: TxStatus::Pending,
            block_number: None,
            gas_used: None,
        }
    }
}

/// Polls a submitted transaction hash until a terminal status is observed.
pub struct TransactionTracker {
    provider: Arc<dyn WalletProvider>,
}

impl TransactionTracker {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self { provider }
    }

    /// Single status read. No receipt yet means pending.
    pub async fn status(&self, tx_hash: &str) -> AppResult<TxStatusReport> {
        match self.provider.transaction_receipt(tx_hash).await? {
            None => Ok(TxStatusReport::pending()),
            Some(receipt) => Ok(parse_receipt(&receipt)),
        }
    }

    /// Re-read the status on a fixed interval until terminal, the attempt
    /// bound is exhausted, or the token is cancelled.
    pub async fn poll_until_terminal(
        &self,
        tx_hash: &str,
        policy: PollPolicy,
        cancel: &CancelToken,
    ) -> AppResult<TxStatusReport> {
        for attempt in 1..=policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            match self.status(tx_hash).await {
                Ok(report) if report.status.is_terminal() => {
                    debug!(
                        "transaction {} {} after {} polls",
                        tx_hash, report.status, attempt
                    );
                    return Ok(report);
                }
                Ok(_) => {}
                // A flaky read counts as a pending poll; the bound still holds.
                Err(e) => warn!("receipt read failed for {}: {}", tx_hash, e),
            }

            if attempt < policy.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(policy.interval) => {}
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                }
            }
        }

        Err(AppError::TransactionTimeout {
            tx_hash: tx_hash.to_string(),
            attempts: policy.max_attempts,
        })
    }
}

fn parse_receipt(receipt: &Value) -> TxStatusReport {
    let success = receipt
        .get("status")
        .and_then(Value::as_str)
        .map(|s| parse_hex_u64(s) == Some(1))
        .unwrap_or(false);

    TxStatusReport {
        status: if success {
            TxStatus::Confirmed
        } else {
            TxStatus::Failed
        },
        block_number: receipt
            .get("blockNumber")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64),
        gas_used: receipt
            .get("gasUsed")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64),
    }
}
