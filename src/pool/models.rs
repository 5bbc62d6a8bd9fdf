use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Loan lifecycle on the pool contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Funded,
    Repaying,
    Closed,
    Defaulted,
}

impl LoanStatus {
    /// Contract-side status codes, in declaration order.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LoanStatus::Pending),
            1 => Some(LoanStatus::Funded),
            2 => Some(LoanStatus::Repaying),
            3 => Some(LoanStatus::Closed),
            4 => Some(LoanStatus::Defaulted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    Active,
    Matured,
    Withdrawn,
}

/// Off-chain mirror of a confirmed pool investment. Interest accrual is an
/// external process this core only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: Uuid,
    pub investor: String,
    pub amount: Decimal,
    pub apy: Decimal,
    pub maturity_date: DateTime<Utc>,
    pub earned_interest: Decimal,
    pub status: InvestmentStatus,
}

/// Borrower application as read back from the pool contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: u64,
    pub borrower: String,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub duration_days: u64,
    pub purpose: String,
    pub status: LoanStatus,
}

/// Derived, on-demand aggregate of pool metrics. Never authoritative - the
/// chain is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub total_invested: Decimal,
    pub total_borrowed: Decimal,
    pub available_liquidity: Decimal,
    pub total_investors: u64,
    pub current_apy: Decimal,
    pub utilization_rate: Decimal,
}

impl PoolSnapshot {
    /// Compute the derived fields from the raw aggregates:
    /// `available_liquidity == max(0, total_invested - total_borrowed)`.
    pub fn derive(
        total_invested: Decimal,
        total_borrowed: Decimal,
        total_investors: u64,
        current_apy: Decimal,
    ) -> Self {
        let available_liquidity = (total_invested - total_borrowed).max(Decimal::ZERO);
        let utilization_rate = if total_invested > Decimal::ZERO {
            (total_borrowed / total_invested * Decimal::ONE_HUNDRED).min(Decimal::ONE_HUNDRED)
        } else {
            Decimal::ZERO
        };

        Self {
            total_invested,
            total_borrowed,
            available_liquidity,
            total_investors,
            current_apy,
            utilization_rate,
        }
    }
}
