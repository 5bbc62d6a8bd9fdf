//! Client-side payment and investment-pool orchestration core for an
//! EVM-compatible chain.
//!
//! The crate wires a wallet session against a target network, dispatches
//! native and token payments, tracks transaction lifecycles with bounded
//! polling, keeps a capped local transaction ledger, and reconciles on-chain
//! lending-pool state with an off-chain record store. See [`bootstrap::AppCore`]
//! for the composition root.

pub mod bootstrap;
pub mod config;
pub mod contracts;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod oracle;
pub mod persistence;
pub mod pool;
pub mod provider;
pub mod retry;
pub mod trust;
pub mod wallet;

pub use bootstrap::AppCore;
pub use config::{Config, NetworkDescriptor};
pub use coordinator::{ReconciliationCoordinator, RefreshEvent};
pub use error::{AppError, AppResult};
pub use execution::{
    CancelToken, PaymentDispatcher, PaymentRequest, PollPolicy, TransactionResult,
};
pub use ledger::{Currency, TransactionLedger, TransactionRecord, TxKind, TxStatus};
pub use pool::{Investment, Loan, PoolAccountingService, PoolSnapshot};
pub use provider::{HttpRpcProvider, WalletProvider};
pub use wallet::{connect, WalletSession};
