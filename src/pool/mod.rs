pub mod models;

use ethers::abi::{ParamType, Token};
use ethers::types::U256;
use ethers::utils::format_units;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, info};

use crate::contracts::{
    decode_outputs, decode_uint, encode_call, parse_address, revert_reason, scale_amount,
    u256_to_hex,
};
use crate::error::{AppError, AppResult, ContractError, RpcError};
use crate::provider::TxCall;
use crate::retry::read_with_retry;
use crate::wallet::WalletSession;

pub use models::{Investment, InvestmentStatus, Loan, LoanStatus, PoolSnapshot};

/// Issues pool-mutating calls and aggregates contract reads into snapshots.
///
/// Mutations return the submitted transaction hash; the reconciliation
/// coordinator owns the ledger append and confirmation poll. Reads are
/// idempotent and go through the bounded-retry reader.
pub struct PoolAccountingService {
    session: WalletSession,
    pool: String,
}

impl PoolAccountingService {
    pub fn new(session: WalletSession, pool_address: &str) -> AppResult<Self> {
        let pool = parse_address(pool_address)?;
        Ok(Self {
            session,
            pool: format!("{pool:#x}"),
        })
    }

    /// Deposit native currency into the lending pool.
    pub async fn invest_in_pool(&self, amount: Decimal) -> AppResult<String> {
        let value = scale_amount(&amount.to_string(), 18)?;
        let call = TxCall {
            from: Some(self.session.address.clone()),
            to: self.pool.clone(),
            value: Some(u256_to_hex(value)),
            gas: None,
            data: Some(encode_call("invest()", &[])),
        };

        let tx_hash = self.send(&call).await?;
        info!("pool investment submitted: {} ({})", amount, tx_hash);
        Ok(tx_hash)
    }

    /// Borrower application; no off-chain mirror is kept for these.
    pub async fn apply_for_loan(
        &self,
        amount: Decimal,
        purpose: &str,
        daily_repayment_pct: Decimal,
    ) -> AppResult<String> {
        let scaled_amount = scale_amount(&amount.to_string(), 18)?;
        // Percentage carried as basis points on chain.
        let repayment_bps = (daily_repayment_pct * Decimal::ONE_HUNDRED)
            .trunc()
            .to_string();
        let repayment = U256::from_dec_str(&repayment_bps)
            .map_err(|e| AppError::InvalidInput(format!("repayment pct: {e}")))?;

        let call = TxCall {
            from: Some(self.session.address.clone()),
            to: self.pool.clone(),
            value: None,
            gas: None,
            data: Some(encode_call(
                "applyForLoan(uint256,string,uint256)",
                &[
                    Token::Uint(scaled_amount),
                    Token::String(purpose.to_string()),
                    Token::Uint(repayment),
                ],
            )),
        };

        let tx_hash = self.send(&call).await?;
        info!("loan application submitted: {} ({})", amount, tx_hash);
        Ok(tx_hash)
    }

    /// Fund part of a specific pending loan.
    pub async fn invest_in_loan(&self, loan_id: u64, amount: Decimal) -> AppResult<String> {
        self.send_loan_call("investInLoan(uint256)", loan_id, amount)
            .await
    }

    /// Repay against a specific loan.
    pub async fn repay_loan(&self, loan_id: u64, amount: Decimal) -> AppResult<String> {
        self.send_loan_call("repayLoan(uint256)", loan_id, amount)
            .await
    }

    async fn send_loan_call(
        &self,
        signature: &str,
        loan_id: u64,
        amount: Decimal,
    ) -> AppResult<String> {
        let value = scale_amount(&amount.to_string(), 18)?;
        let call = TxCall {
            from: Some(self.session.address.clone()),
            to: self.pool.clone(),
            value: Some(u256_to_hex(value)),
            gas: None,
            data: Some(encode_call(signature, &[Token::Uint(U256::from(loan_id))])),
        };

        let tx_hash = self.send(&call).await?;
        info!("{} loan {} for {} ({})", signature, loan_id, amount, tx_hash);
        Ok(tx_hash)
    }

    /// Scan the loan counter id range, filtered to pending applications.
    /// Unreadable loans are skipped rather than failing the whole scan.
    pub async fn pending_loans(&self) -> AppResult<Vec<Loan>> {
        let count = self.loan_count().await;
        let reads = join_all((0..count).map(|id| self.loan(id))).await;

        let mut pending = Vec::new();
        for (id, read) in reads.into_iter().enumerate() {
            match read {
                Ok(loan) if loan.status == LoanStatus::Pending => pending.push(loan),
                Ok(_) => {}
                Err(e) => debug!("skipping unreadable loan {}: {}", id, e),
            }
        }

        Ok(pending)
    }

    async fn loan_count(&self) -> u64 {
        let call = self.read_call("loanCount()", &[]);
        read_with_retry(
            || async {
                let output = self.session.provider.call(&call).await?;
                decode_uint(&output).map(|v| v.low_u64())
            },
            0,
        )
        .await
    }

    async fn loan(&self, id: u64) -> AppResult<Loan> {
        let call = self.read_call("loans(uint256)", &[Token::Uint(U256::from(id))]);
        let output = self.session.provider.call(&call).await?;

        let tokens = decode_outputs(
            &[
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::String,
                ParamType::Uint(8),
            ],
            &output,
        )?;

        let mut tokens = tokens.into_iter();
        let borrower = match tokens.next() {
            Some(Token::Address(a)) => format!("{a:#x}"),
            _ => return Err(ContractError::Decode("loan.borrower".into()).into()),
        };
        let amount = next_uint(&mut tokens, "loan.amount")?;
        let interest_rate = next_uint(&mut tokens, "loan.interestRate")?;
        let duration = next_uint(&mut tokens, "loan.durationDays")?;
        let purpose = match tokens.next() {
            Some(Token::String(s)) => s,
            _ => return Err(ContractError::Decode("loan.purpose".into()).into()),
        };
        let status_code = next_uint(&mut tokens, "loan.status")?;

        Ok(Loan {
            id,
            borrower,
            amount: wei_to_decimal(amount)?,
            interest_rate: bps_to_percent(interest_rate),
            duration_days: duration.low_u64(),
            purpose,
            status: LoanStatus::from_code(status_code.low_u64() as u8).ok_or_else(|| {
                ContractError::Decode(format!("unknown loan status {status_code}"))
            })?,
        })
    }

    /// Aggregate pool metrics plus the derived fields.
    pub async fn pool_snapshot(&self) -> AppResult<PoolSnapshot> {
        let total_invested = self.read_uint("totalInvested()").await;
        let total_borrowed = self.read_uint("totalBorrowed()").await;
        let total_investors = self.read_uint("totalInvestors()").await;
        let current_apy = self.read_uint("currentAPY()").await;

        Ok(PoolSnapshot::derive(
            wei_to_decimal(total_invested)?,
            wei_to_decimal(total_borrowed)?,
            total_investors.low_u64(),
            bps_to_percent(current_apy),
        ))
    }

    async fn read_uint(&self, signature: &str) -> U256 {
        let call = self.read_call(signature, &[]);
        read_with_retry(
            || async {
                let output = self.session.provider.call(&call).await?;
                decode_uint(&output)
            },
            U256::zero(),
        )
        .await
    }

    fn read_call(&self, signature: &str, args: &[Token]) -> TxCall {
        TxCall {
            to: self.pool.clone(),
            data: Some(encode_call(signature, args)),
            ..Default::default()
        }
    }

    async fn send(&self, call: &TxCall) -> AppResult<String> {
        self.session
            .provider
            .send_transaction(call)
            .await
            .map_err(map_pool_error)
    }
}

/// Map a provider failure on a pool call into a domain message instead of a
/// raw revert string.
fn map_pool_error(error: AppError) -> AppError {
    let AppError::Rpc(rpc @ RpcError::Provider { .. }) = &error else {
        return error;
    };
    let Some(reason) = revert_reason(rpc) else {
        return error;
    };
    ContractError::Revert(domain_message(&reason)).into()
}

fn domain_message(reason: &str) -> String {
    let lower = reason.to_lowercase();
    if lower.contains("already registered") {
        "This wallet is already registered with the pool".to_string()
    } else if lower.contains("insufficient") {
        "The pool does not have enough liquidity for this operation".to_string()
    } else if lower.contains("not pending") {
        "This loan is no longer open for funding".to_string()
    } else if lower.contains("not the borrower") {
        "Only the borrower can repay this loan".to_string()
    } else {
        reason.to_string()
    }
}

fn next_uint(
    tokens: &mut impl Iterator<Item = Token>,
    field: &str,
) -> AppResult<U256> {
    match tokens.next() {
        Some(Token::Uint(value)) => Ok(value),
        _ => Err(ContractError::Decode(field.to_string()).into()),
    }
}

fn wei_to_decimal(value: U256) -> AppResult<Decimal> {
    let formatted = format_units(value, 18)
        .map_err(|e| ContractError::Decode(format!("wei conversion: {e}")))?;
    Decimal::from_str(&formatted)
        .map_err(|e| ContractError::Decode(format!("wei conversion: {e}")).into())
}

/// On-chain rates are basis points; render them as percentages.
fn bps_to_percent(value: U256) -> Decimal {
    Decimal::from(value.low_u64()) / Decimal::ONE_HUNDRED
}
