//! Runs a unit of work inside a transaction.
//!
//! There is one implementation (`start → work → commit`, rollback on any
//! failure) exposed through two call conventions: [`TransactionRunner::run`]
//! hands the unit of work's own error back to the caller, while
//! [`TransactionRunner::run_unchecked`] folds every failure into
//! [`DbError::Persistence`].

use crate::db::session::Session;
use crate::error::DbError;
use crate::models::TransactionState;
use futures_util::future::BoxFuture;
use std::fmt::Display;
use tracing::error;

/// Failure of one run: either the unit of work or the transaction itself.
enum Failure<E> {
    Work(E),
    Db(DbError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionRunner;

impl TransactionRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `work` in a transaction, returning its own error type on failure.
    ///
    /// The transaction is rolled back before the error is returned. Failures
    /// to start or commit are converted through `From<DbError>`.
    pub async fn run<T, E, F>(&self, session: &mut Session, work: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, E>>,
        E: From<DbError> + Display,
    {
        match in_transaction(session, work).await {
            Ok(value) => Ok(value),
            Err(Failure::Work(e)) => Err(e),
            Err(Failure::Db(e)) => Err(E::from(e)),
        }
    }

    /// Run `work` in a transaction, wrapping any failure in
    /// `DbError::Persistence`.
    pub async fn run_unchecked<T, E, F>(&self, session: &mut Session, work: F) -> Result<T, DbError>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match in_transaction(session, work).await {
            Ok(value) => Ok(value),
            Err(Failure::Work(e)) => Err(DbError::persistence(e)),
            Err(Failure::Db(e)) => Err(DbError::persistence(e)),
        }
    }
}

async fn in_transaction<T, E, F>(session: &mut Session, work: F) -> Result<T, Failure<E>>
where
    F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, E>>,
    E: Display,
{
    session.start_transaction().await.map_err(Failure::Db)?;
    let mut guard = OpenTransaction { session };

    let value = match work(&mut *guard.session).await {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Unit of work failed; rolling back");
            rollback_quietly(&mut *guard.session).await;
            return Err(Failure::Work(e));
        }
    };

    // Commit ends the transaction whatever its outcome
    guard.session.commit_transaction().await.map_err(Failure::Db)?;
    Ok(value)
}

/// Abandons the transaction if the run is dropped before it ends.
struct OpenTransaction<'a> {
    session: &'a mut Session,
}

impl Drop for OpenTransaction<'_> {
    fn drop(&mut self) {
        if self.session.transaction_state().is_active() {
            self.session.abandon_transaction();
        }
    }
}

/// Roll back if still active. A rollback failure is logged, never returned.
async fn rollback_quietly(session: &mut Session) {
    if session.transaction_state() != TransactionState::Active {
        return;
    }
    if let Err(e) = session.rollback_transaction().await {
        error!(error = %e, "Rollback failed");
    }
}
