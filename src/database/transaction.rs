//! Transaction scoping for units of work.
//!
//! # Responsibilities
//! - Run a caller-supplied unit of work inside exactly one transaction
//! - Commit on success, roll back on error, panic or cancellation
//! - Hand the open transaction to the unit of work as an explicit argument
//!
//! # Design Decisions
//! - The scope is a `&mut` borrow for the duration of the call, so it
//!   cannot outlive `with_transaction`; nested helpers take the same
//!   `&mut` and therefore share the transaction
//! - The open transaction lives in a guard whose `Drop` abandons it;
//!   every exit path (including a dropped future) releases the connection
//! - The manager holds no mutable state: concurrent calls are independent

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::future::{BoxFuture, FutureExt};
use sqlx::{Postgres, Transaction as SqlxTransaction};

use crate::database::pool::Database;
use crate::error::{Error, ErrorKind};

/// Something that can open transactions (a pool).
pub trait TransactionSource: Send + Sync {
    type Transaction: Transaction;

    /// Lease a connection and issue `BEGIN`.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, Error>> + Send;
}

/// An open transaction.
pub trait Transaction: Send + 'static {
    fn commit(self) -> impl Future<Output = Result<(), Error>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Release without an explicit decision. Must not block; the default
    /// just drops the transaction, which is expected to roll it back.
    fn abandon(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

impl TransactionSource for Database {
    type Transaction = SqlxTransaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Transaction, Error> {
        Ok(self.pool().begin().await?)
    }
}

// sqlx queues a ROLLBACK when a transaction is dropped unfinished,
// so the default `abandon` is correct here.
impl Transaction for SqlxTransaction<'static, Postgres> {
    async fn commit(self) -> Result<(), Error> {
        Ok(SqlxTransaction::commit(self).await?)
    }

    async fn rollback(self) -> Result<(), Error> {
        Ok(SqlxTransaction::rollback(self).await?)
    }
}

/// Owns an open transaction until commit or rollback is decided.
struct TxGuard<T: Transaction> {
    tx: Option<T>,
}

impl<T: Transaction> TxGuard<T> {
    fn new(tx: T) -> Self {
        Self { tx: Some(tx) }
    }

    fn scope(&mut self) -> &mut T {
        // Only `commit`/`rollback` take the transaction, and both consume the guard.
        self.tx.as_mut().unwrap_or_else(|| unreachable!("transaction already finished"))
    }

    async fn commit(mut self) -> Result<(), Error> {
        match self.tx.take() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }

    async fn rollback(mut self) -> Result<(), Error> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }
}

impl<T: Transaction> Drop for TxGuard<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!("transaction dropped before commit or rollback, abandoning it");
            tx.abandon();
        }
    }
}

/// Runs units of work inside transactions.
#[derive(Debug, Clone)]
pub struct TransactionManager<S> {
    source: S,
}

impl<S: TransactionSource> TransactionManager<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Execute `work` within a transaction.
    ///
    /// - `Ok` from `work`: commit; a commit failure is returned as an
    ///   `Infrastructure` error and the value is discarded.
    /// - `Err` from `work`: roll back and return the error unchanged, or a
    ///   combined error if the rollback fails as well.
    /// - panic in `work`: roll back, then resume the panic.
    ///
    /// ```ignore
    /// let id = manager
    ///     .with_transaction(|tx| Box::pin(async move {
    ///         let row: (i64,) = sqlx::query_as("INSERT INTO orders DEFAULT VALUES RETURNING id")
    ///             .fetch_one(&mut **tx)
    ///             .await?;
    ///         Ok(row.0)
    ///     }))
    ///     .await?;
    /// ```
    ///
    /// The transaction is only borrowed for the duration of `work` and
    /// cannot be kept after the call:
    ///
    /// ```compile_fail
    /// use futures_util::FutureExt;
    /// use shared_infra::database::{Database, TransactionManager};
    /// use shared_infra::error::Error;
    ///
    /// async fn keep_scope(manager: TransactionManager<Database>) {
    ///     let mut kept = None;
    ///     let _ = manager
    ///         .with_transaction(|tx| {
    ///             kept = Some(tx);
    ///             async { Ok::<(), Error>(()) }.boxed()
    ///         })
    ///         .await;
    ///     drop(kept);
    /// }
    /// ```
    pub async fn with_transaction<T, F>(&self, work: F) -> Result<T, Error>
    where
        F: for<'t> FnOnce(&'t mut S::Transaction) -> BoxFuture<'t, Result<T, Error>> + Send,
        T: Send,
    {
        let tx = self
            .source
            .begin()
            .await
            .map_err(|e| Error::foreign(ErrorKind::Infrastructure, "failed to begin transaction", e))?;
        let mut guard = TxGuard::new(tx);

        let outcome = {
            let scope = guard.scope();
            AssertUnwindSafe(async move { work(scope).await })
                .catch_unwind()
                .await
        };

        match outcome {
            Ok(Ok(value)) => {
                guard
                    .commit()
                    .await
                    .map_err(|e| Error::foreign(ErrorKind::Infrastructure, "failed to commit transaction", e))?;
                Ok(value)
            }
            Ok(Err(err)) => match guard.rollback().await {
                Ok(()) => Err(err),
                Err(rollback) => {
                    tracing::error!(error = %err, rollback_error = %rollback, "rollback failed");
                    Err(Error::rollback_failed(err, rollback))
                }
            },
            Err(panic) => {
                if let Err(rollback) = guard.rollback().await {
                    tracing::error!(error = %rollback, "rollback after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
