use thiserror::Error;

/// Top-level error type for the entire core
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientFunds {
        asset: String,
        required: String,
        available: String,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transaction confirmation timed out after {attempts} polls: {tx_hash}")]
    TransactionTimeout { tx_hash: String, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Off-chain persistence failed after on-chain success: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wallet/provider session errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("User rejected the request")]
    Rejected,

    #[error("No account returned by the wallet")]
    NoAccount,

    #[error("Wallet is on chain {actual}, expected {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("Network switch failed: {0}")]
    SwitchFailed(String),
}

/// Transport-level RPC errors
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("Transient RPC failure: {0}")]
    Transient(String),

    #[error("RPC request timed out")]
    Timeout,

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    /// JSON-RPC / EIP-1193 error object with its numeric code preserved.
    #[error("Provider error {code}: {message}")]
    Provider {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
}

/// Contract call errors
#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Execution reverted: {0}")]
    Revert(String),

    #[error("Could not decode return data: {0}")]
    Decode(String),

    #[error("ABI encoding failed: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AppError::Rpc(RpcError::Timeout)
        } else {
            AppError::Rpc(RpcError::Transient(error.to_string()))
        }
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("{:?}", error))
    }
}

/// Result type alias for the core
pub type AppResult<T> = Result<T, AppError>;

/// EIP-1193 user rejection
pub const CODE_USER_REJECTED: i64 = 4001;
/// EIP-3085/3326 unrecognized chain id
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;

impl AppError {
    /// Whether the underlying provider reported the EIP-1193 "user rejected" code.
    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self,
            AppError::Rpc(RpcError::Provider {
                code: CODE_USER_REJECTED,
                ..
            })
        ) || matches!(self, AppError::Wallet(WalletError::Rejected))
    }
}
