pub mod models;
pub mod store;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

pub use models::{Currency, TransactionRecord, TxKind, TxStatus};
pub use store::{JsonFileStore, LedgerStore, MemoryStore};

/// Maximum retained history entries; the oldest is evicted beyond this.
pub const MAX_ENTRIES: usize = 10;

/// Capped, reverse-chronological history of dispatched transactions.
///
/// Entries are keyed by transaction hash, not position: confirmations may
/// arrive out of submission order and update in place.
pub struct TransactionLedger {
    entries: Mutex<Vec<TransactionRecord>>,
    store: Arc<dyn LedgerStore>,
    /// Held across each mutate+save pair so snapshots reach the store in
    /// mutation order; a slow save must not be overwritten by an older one.
    write_gate: tokio::sync::Mutex<()>,
}

impl TransactionLedger {
    /// Hydrate the ledger from its backing store.
    pub async fn open(store: Arc<dyn LedgerStore>) -> AppResult<Self> {
        let mut entries = store.load().await?;
        entries.truncate(MAX_ENTRIES);
        Ok(Self {
            entries: Mutex::new(entries),
            store,
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Insert at the head, evicting the oldest entry beyond the cap.
    pub async fn append(&self, record: TransactionRecord) -> AppResult<()> {
        let _write = self.write_gate.lock().await;
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.insert(0, record);
            if entries.len() > MAX_ENTRIES {
                let evicted = entries.pop();
                if let Some(evicted) = evicted {
                    debug!("evicted oldest history entry: {}", evicted.tx_hash);
                }
            }
            entries.clone()
        };
        self.store.save(&snapshot).await
    }

    /// Replace the status of the record with the given hash, preserving its
    /// position. A terminal status never regresses.
    pub async fn update_status(&self, tx_hash: &str, status: TxStatus) -> AppResult<()> {
        let _write = self.write_gate.lock().await;
        let snapshot = {
            let mut entries = self.entries.lock();
            let record = entries
                .iter_mut()
                .find(|r| r.tx_hash == tx_hash)
                .ok_or_else(|| AppError::InvalidInput(format!("no such transaction: {tx_hash}")))?;

            if record.status == status {
                return Ok(());
            }
            if record.status.is_terminal() {
                warn!(
                    "refusing status regression {} -> {} for {}",
                    record.status, status, tx_hash
                );
                return Err(AppError::InvalidInput(format!(
                    "transaction {tx_hash} already {}",
                    record.status
                )));
            }
            record.status = status;
            entries.clone()
        };
        self.store.save(&snapshot).await
    }

    /// Newest-first snapshot of the history.
    pub fn history(&self) -> Vec<TransactionRecord> {
        self.entries.lock().clone()
    }

    pub fn head(&self) -> Option<TransactionRecord> {
        self.entries.lock().first().cloned()
    }

    /// Explicit wipe; nothing else ever deletes individual entries.
    pub async fn clear(&self) -> AppResult<()> {
        let _write = self.write_gate.lock().await;
        self.entries.lock().clear();
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn record(hash: &str) -> TransactionRecord {
        TransactionRecord::pending(hash, TxKind::Payment, dec!(1), Currency::Native)
    }

    async fn ledger() -> TransactionLedger {
        TransactionLedger::open(Arc::new(MemoryStore::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn newest_entry_is_head() {
        let ledger = ledger().await;
        ledger.append(record("0xaaa")).await.unwrap();
        ledger.append(record("0xbbb")).await.unwrap();

        let history = ledger.history();
        assert_eq!(history[0].tx_hash, "0xbbb");
        assert_eq!(history[1].tx_hash, "0xaaa");
    }

    #[tokio::test]
    async fn eleventh_insert_evicts_the_oldest() {
        let ledger = ledger().await;
        for i in 0..11 {
            ledger.append(record(&format!("0x{i:03}"))).await.unwrap();
        }

        let history = ledger.history();
        assert_eq!(history.len(), MAX_ENTRIES);
        assert_eq!(history[0].tx_hash, "0x010");
        // 0x000 was the first in and is gone
        assert!(history.iter().all(|r| r.tx_hash != "0x000"));
    }

    #[tokio::test]
    async fn update_preserves_position() {
        let ledger = ledger().await;
        ledger.append(record("0xaaa")).await.unwrap();
        ledger.append(record("0xbbb")).await.unwrap();

        ledger
            .update_status("0xaaa", TxStatus::Confirmed)
            .await
            .unwrap();

        let history = ledger.history();
        assert_eq!(history[1].tx_hash, "0xaaa");
        assert_eq!(history[1].status, TxStatus::Confirmed);
        assert_eq!(history[0].status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn terminal_status_never_regresses() {
        let ledger = ledger().await;
        ledger.append(record("0xaaa")).await.unwrap();
        ledger
            .update_status("0xaaa", TxStatus::Failed)
            .await
            .unwrap();

        // Same terminal value is an idempotent no-op.
        ledger
            .update_status("0xaaa", TxStatus::Failed)
            .await
            .unwrap();

        let err = ledger
            .update_status("0xaaa", TxStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(ledger.head().unwrap().status, TxStatus::Failed);
    }

    /// Store whose next save can be parked until released, to order
    /// concurrent writers deterministically.
    #[derive(Default)]
    struct GatedStore {
        last_saved: Mutex<Vec<TransactionRecord>>,
        hold_next: AtomicBool,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl LedgerStore for GatedStore {
        async fn load(&self) -> AppResult<Vec<TransactionRecord>> {
            Ok(self.last_saved.lock().clone())
        }

        async fn save(&self, records: &[TransactionRecord]) -> AppResult<()> {
            if self.hold_next.swap(false, Ordering::SeqCst) {
                self.release.notified().await;
            }
            *self.last_saved.lock() = records.to_vec();
            Ok(())
        }

        async fn clear(&self) -> AppResult<()> {
            self.last_saved.lock().clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_updates_never_persist_a_stale_snapshot() {
        let store = Arc::new(GatedStore::default());
        let ledger = Arc::new(TransactionLedger::open(store.clone()).await.unwrap());
        ledger.append(record("0xaaa")).await.unwrap();
        ledger.append(record("0xbbb")).await.unwrap();

        // Park the next save mid-flight, then race a second update against it.
        store.hold_next.store(true, Ordering::SeqCst);
        let first = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.update_status("0xaaa", TxStatus::Confirmed).await }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.update_status("0xbbb", TxStatus::Confirmed).await }
        });
        tokio::task::yield_now().await;

        store.release.notify_one();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Whatever the interleaving, the snapshot on disk must reflect both
        // confirmations; a reload must never resurrect a pending status.
        let saved = store.last_saved.lock().clone();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|r| r.status == TxStatus::Confirmed));

        let reloaded = TransactionLedger::open(store.clone()).await.unwrap();
        assert!(reloaded
            .history()
            .iter()
            .all(|r| r.status == TxStatus::Confirmed));
    }

    #[tokio::test]
    async fn history_survives_reopen_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        {
            let store = Arc::new(JsonFileStore::new(&path));
            let ledger = TransactionLedger::open(store).await.unwrap();
            ledger.append(record("0xaaa")).await.unwrap();
            ledger
                .update_status("0xaaa", TxStatus::Confirmed)
                .await
                .unwrap();
        }

        let store = Arc::new(JsonFileStore::new(&path));
        let reopened = TransactionLedger::open(store).await.unwrap();
        let head = reopened.head().unwrap();
        assert_eq!(head.tx_hash, "0xaaa");
        assert_eq!(head.status, TxStatus::Confirmed);

        reopened.clear().await.unwrap();
        assert!(reopened.history().is_empty());
        let reloaded = TransactionLedger::open(Arc::new(JsonFileStore::new(&path)))
            .await
            .unwrap();
        assert!(reloaded.history().is_empty());
    }
}
