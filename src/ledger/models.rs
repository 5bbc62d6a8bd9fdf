use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency accounting model for a value transfer. A request carries exactly
/// one variant; the two dispatch paths never mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Native,
    Token { address: String },
}

impl Currency {
    pub fn label(&self) -> &'static str {
        match self {
            Currency::Native => "native",
            Currency::Token { .. } => "token",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Transaction status as observed from receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    /// Confirmed and failed are terminal; a record never leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Payment,
    Claim,
    Reward,
    Investment,
}

/// One dispatched transaction in the local history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub kind: TxKind,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TxStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
}

impl TransactionRecord {
    pub fn pending(tx_hash: impl Into<String>, kind: TxKind, amount: Decimal, currency: Currency) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            kind,
            amount,
            currency,
            status: TxStatus::Pending,
            timestamp: Utc::now(),
            deal_id: None,
            business_id: None,
        }
    }
}
