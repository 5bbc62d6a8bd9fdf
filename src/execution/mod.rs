pub mod dispatcher;
pub mod tracker;

pub use dispatcher::{PaymentDispatcher, PaymentRequest, TransactionResult};
pub use tracker::{CancelToken, PollPolicy, TransactionTracker, TxStatusReport};
