// In-process backend used by the test suites and local runs without Postgres
//
// A transaction takes the store lock for its whole lifetime and keeps a
// snapshot of the tables taken at begin. Rolling back (or dropping the
// transaction) restores the snapshot. Transactions are therefore fully
// serialized, which is stricter than the row locks the Postgres backend
// relies on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::auth::models::{Session, User};
use crate::db::{Engine, StoreError, TxBackend};

/// Rows held by the in-memory store
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub users: HashMap<Uuid, User>,
    pub sessions: HashMap<Uuid, Session>,
}

/// Counters of finished transactions
#[derive(Debug, Default)]
pub struct TxStats {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

impl TxStats {
    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
    stats: Arc<TxStats>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &TxStats {
        &self.stats
    }

    /// Makes the next commit fail; the transaction is rolled back instead
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Copy of the committed state. Waits for any open transaction.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

/// Open in-memory transaction
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    snapshot: Option<Tables>,
    stats: Arc<TxStats>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
            self.stats.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl TxBackend for MemoryBackend {
    type Conn = OwnedMutexGuard<Tables>;
    type Tx = MemoryTx;

    async fn acquire(&self) -> Result<Self::Conn, StoreError> {
        Ok(self.tables.clone().lock_owned().await)
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let snapshot = guard.clone();
        self.stats.begun.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx {
            guard,
            snapshot: Some(snapshot),
            stats: self.stats.clone(),
        })
    }

    async fn commit(&self, mut tx: Self::Tx) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            drop(tx);
            return Err(StoreError::Backend("commit rejected by store".into()));
        }
        tx.snapshot = None;
        self.stats.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        drop(tx);
        Ok(())
    }
}

impl Engine<'_, MemoryBackend> {
    pub fn tables(&mut self) -> Result<&mut Tables, StoreError> {
        match self {
            Engine::Pool(guard) => Ok(&mut **guard),
            Engine::Tx(slot) => (**slot)
                .as_mut()
                .map(|tx| &mut *tx.guard)
                .ok_or(StoreError::TransactionClosed),
        }
    }
}
