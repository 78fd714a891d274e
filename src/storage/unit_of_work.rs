use std::marker::PhantomData;

use anyhow::{Context, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

/// How a unit of work interacts with concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Deferred transaction: a consistent snapshot for reads, no writer lock.
    Read,
    /// Claims the database writer lock before the first read, so checks
    /// and the writes that depend on them run under the same lock.
    Write,
}

/// A statement that touches no rows but still takes SQLite's writer lock.
/// Waiting for the lock honours the configured busy timeout.
const CLAIM_WRITER_LOCK: &str = "UPDATE users SET balance = balance WHERE 0";

/// An open store transaction handed to repository calls.
///
/// Dropping a unit of work without committing rolls it back, which covers
/// panics inside a transactional closure and cancelled futures.
pub struct UnitOfWork<'a> {
    tx: Transaction<'static, Sqlite>,
    mode: TxMode,
    // Invariant in 'a: ties everything a transactional closure borrows
    // to the scope of the transaction.
    _scope: PhantomData<&'a mut &'a ()>,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) async fn begin(pool: &SqlitePool, mode: TxMode) -> Result<Self> {
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        if mode == TxMode::Write {
            sqlx::query(CLAIM_WRITER_LOCK)
                .execute(&mut *tx)
                .await
                .context("Failed to acquire writer lock")?;
        }

        Ok(Self {
            tx,
            mode,
            _scope: PhantomData,
        })
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// The connection every statement of this unit of work runs on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub(crate) async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }

    pub(crate) async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back transaction")
    }
}
