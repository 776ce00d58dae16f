// PostgreSQL backend for the unit of work

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::db::{Engine, StoreError, TxBackend};

/// Transactions are opened at READ COMMITTED; operations that need more than
/// that take explicit row locks.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TxBackend for PgBackend {
    type Conn = PoolConnection<Postgres>;
    type Tx = Transaction<'static, Postgres>;

    async fn acquire(&self) -> Result<Self::Conn, StoreError> {
        Ok(self.pool.acquire().await?)
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await?;
        Ok(())
    }
}

impl Engine<'_, PgBackend> {
    /// Connection to run the statement on: the pooled connection, or the one
    /// owned by the bound transaction
    pub fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        match self {
            Engine::Pool(conn) => Ok(&mut **conn),
            Engine::Tx(slot) => (**slot)
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or(StoreError::TransactionClosed),
        }
    }
}
