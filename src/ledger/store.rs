use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{AppError, AppResult};
use crate::ledger::models::TransactionRecord;

/// Backing storage for the capped local transaction history.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self) -> AppResult<Vec<TransactionRecord>>;
    async fn save(&self, records: &[TransactionRecord]) -> AppResult<()>;
    async fn clear(&self) -> AppResult<()>;
}

/// JSON array in a single file under a fixed path; survives restarts.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LedgerStore for JsonFileStore {
    async fn load(&self) -> AppResult<Vec<TransactionRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AppError::Internal(format!("corrupt history file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AppError::Internal(format!("history read failed: {e}"))),
        }
    }

    async fn save(&self, records: &[TransactionRecord]) -> AppResult<()> {
        let bytes = serde_json::to_vec(records)
            .map_err(|e| AppError::Internal(format!("history serialize failed: {e}")))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("history write failed: {e}")))
    }

    async fn clear(&self) -> AppResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Internal(format!("history clear failed: {e}"))),
        }
    }
}

/// In-memory store, used by tests and sessions without a writable disk.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<TransactionRecord>>,
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self) -> AppResult<Vec<TransactionRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn save(&self, records: &[TransactionRecord]) -> AppResult<()> {
        *self.records.lock() = records.to_vec();
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.records.lock().clear();
        Ok(())
    }
}
