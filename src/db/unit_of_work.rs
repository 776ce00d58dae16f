// Unit of work: transaction scopes over a shared connection pool
//
// A `Scope` is passed explicitly to every repository call. The root scope
// resolves to a pooled connection per call; a scope returned by `begin` is
// bound to one open transaction and every call made through it (or through a
// scope derived from it) runs inside that transaction.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::db::StoreError;

/// Transaction primitives a storage backend must provide
#[async_trait]
pub trait TxBackend: Send + Sync + 'static {
    /// Connection checked out for a single call outside any transaction
    type Conn: Send;
    /// An open transaction. Dropping it without committing must roll it back
    /// and release its connection.
    type Tx: Send + 'static;

    async fn acquire(&self) -> Result<Self::Conn, StoreError>;
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
}

type TxSlot<B> = Mutex<Option<<B as TxBackend>::Tx>>;

/// Execution scope handed to repositories
///
/// Only the scope returned by the `begin` call that opened the transaction
/// owns it; views derived with [`Scope::borrowed`] share the transaction but
/// can neither commit nor roll it back.
pub struct Scope<B: TxBackend> {
    tx: Option<Arc<TxSlot<B>>>,
    owner: bool,
}

impl<B: TxBackend> Scope<B> {
    /// Scope with no transaction; each call runs on its own pooled connection
    pub fn root() -> Self {
        Self {
            tx: None,
            owner: false,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn owns_transaction(&self) -> bool {
        self.owner
    }

    /// Non-owning view over the same transaction (or the pool)
    pub fn borrowed(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            owner: false,
        }
    }

    /// Resolves the handle a repository call should run on
    ///
    /// Inside a transaction the returned engine holds the transaction for the
    /// duration of the call, so calls sharing a transaction never interleave
    /// on its connection.
    pub async fn engine(&self, backend: &B) -> Result<Engine<'_, B>, StoreError> {
        match &self.tx {
            Some(slot) => {
                let guard = slot.lock().await;
                if guard.is_none() {
                    return Err(StoreError::TransactionClosed);
                }
                Ok(Engine::Tx(guard))
            }
            None => Ok(Engine::Pool(backend.acquire().await?)),
        }
    }
}

impl<B: TxBackend> Default for Scope<B> {
    fn default() -> Self {
        Self::root()
    }
}

impl<B: TxBackend> fmt::Debug for Scope<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("in_transaction", &self.in_transaction())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Database handle resolved for one repository call
pub enum Engine<'a, B: TxBackend> {
    Pool(B::Conn),
    Tx(MutexGuard<'a, Option<B::Tx>>),
}

/// Transaction coordinator
///
/// Scopes opened while another transaction is already bound are flattened
/// into it: there are no nested transactions or savepoints.
pub struct UnitOfWork<B: TxBackend> {
    backend: Arc<B>,
}

impl<B: TxBackend> Clone for UnitOfWork<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: TxBackend> UnitOfWork<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Opens a transaction unless `scope` is already bound to one
    ///
    /// When it is, the returned scope is a non-owning view of the enclosing
    /// transaction and committing or rolling it back is a no-op.
    pub async fn begin(&self, scope: &Scope<B>) -> Result<Scope<B>, StoreError> {
        if scope.in_transaction() {
            debug!("Joining enclosing transaction");
            return Ok(scope.borrowed());
        }

        let tx = self.backend.begin().await?;
        debug!("Transaction started");
        Ok(Scope {
            tx: Some(Arc::new(Mutex::new(Some(tx)))),
            owner: true,
        })
    }

    /// Commits the transaction owned by `scope`
    pub async fn commit(&self, scope: Scope<B>) -> Result<(), StoreError> {
        match take_owned(&scope).await? {
            Some(tx) => {
                self.backend.commit(tx).await?;
                debug!("Transaction committed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Rolls back the transaction owned by `scope`
    pub async fn rollback(&self, scope: Scope<B>) -> Result<(), StoreError> {
        match take_owned(&scope).await? {
            Some(tx) => {
                self.backend.rollback(tx).await?;
                debug!("Transaction rolled back");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Runs `f` inside one transaction
    ///
    /// - `f` returns `Ok`: the transaction is committed; a failed commit is
    ///   returned as the error.
    /// - `f` returns `Err`: the transaction is rolled back and the error
    ///   returned unchanged.
    /// - `f` panics: the transaction is rolled back and the panic resumed.
    ///
    /// If the returned future is dropped before completion the owned
    /// transaction is dropped with it, which rolls it back and returns its
    /// connection to the pool.
    pub async fn run_atomic<F, Fut, T, E>(&self, scope: &Scope<B>, f: F) -> Result<T, E>
    where
        F: FnOnce(Scope<B>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StoreError> + fmt::Display,
    {
        let tx_scope = self.begin(scope).await?;
        let view = tx_scope.borrowed();

        let outcome = AssertUnwindSafe(async move { f(view).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => {
                if let Err(err) = self.commit(tx_scope).await {
                    error!(error = %err, "Failed to commit transaction");
                    return Err(err.into());
                }
                Ok(value)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Error in transaction, rolling back");
                if let Err(rollback_err) = self.rollback(tx_scope).await {
                    error!(error = %rollback_err, "Failed to roll back transaction");
                }
                Err(err)
            }
            Err(panic) => {
                error!("Panic in transaction, rolling back");
                if let Err(rollback_err) = self.rollback(tx_scope).await {
                    error!(error = %rollback_err, "Failed to roll back transaction after panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

async fn take_owned<B: TxBackend>(scope: &Scope<B>) -> Result<Option<B::Tx>, StoreError> {
    if !scope.owner {
        return Ok(None);
    }
    let slot = scope.tx.as_ref().ok_or(StoreError::TransactionClosed)?;
    let tx = slot.lock().await.take().ok_or(StoreError::TransactionClosed)?;
    Ok(Some(tx))
}
