//! Transaction demarcation for one unit of work.
//!
//! The manager drives `BEGIN` / `COMMIT` / `ROLLBACK` on the connection held
//! by the unit of work's `ConnectionContext`. Transactions do not nest.
//! Commit and rollback always empty the connection slot, whatever their
//! outcome: a successfully finished connection goes back to the pool, a
//! connection whose transaction could not be finished cleanly is discarded.

use crate::db::connection::{ConnectionContext, DbConnection};
use crate::error::{DbError, DbResult};
use crate::models::{TransactionInfo, TransactionState};
use tracing::{error, info, warn};

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug, Default)]
pub struct TransactionManager {
    state: TransactionState,
    current: Option<TransactionInfo>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Active` while a transaction is open, otherwise the outcome of the
    /// last one (`Idle` if there was none).
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Metadata of the open transaction.
    pub fn current(&self) -> Option<&TransactionInfo> {
        self.current.as_ref()
    }

    /// Fail fast when a transaction is already open.
    pub fn ensure_can_start(&self) -> DbResult<()> {
        if self.is_active() {
            let id = self.current.as_ref().map(|t| t.id.as_str()).unwrap_or("?");
            return Err(DbError::transaction(
                format!("Transaction {} is already active; nested transactions are not supported", id),
                self.state,
            ));
        }
        Ok(())
    }

    /// Open a transaction on `conn`.
    pub async fn begin(&mut self, conn: &mut DbConnection) -> DbResult<&TransactionInfo> {
        self.ensure_can_start()?;
        run_control(conn, "BEGIN").await?;

        let info = TransactionInfo {
            id: generate_transaction_id(),
            started_at: chrono::Utc::now(),
        };
        info!(
            transaction_id = %info.id,
            db_type = %conn.db_type(),
            "Transaction started"
        );
        self.state = TransactionState::Active;
        Ok(self.current.insert(info))
    }

    /// Commit the open transaction.
    ///
    /// If `COMMIT` fails a `ROLLBACK` is attempted and the connection is
    /// discarded; the state becomes `RolledBack` and the commit error is
    /// returned.
    pub async fn commit(&mut self, connections: &mut ConnectionContext) -> DbResult<()> {
        let (info, mut conn) = self.finish(connections, "commit")?;

        match run_control(&mut conn, "COMMIT").await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                info!(
                    transaction_id = %info.id,
                    duration_secs = info.elapsed_secs(),
                    "Transaction committed"
                );
                drop(conn);
                Ok(())
            }
            Err(commit_err) => {
                self.state = TransactionState::RolledBack;
                if let Err(rollback_err) = run_control(&mut conn, "ROLLBACK").await {
                    error!(
                        transaction_id = %info.id,
                        error = %rollback_err,
                        "Rollback after failed commit also failed"
                    );
                }
                warn!(
                    transaction_id = %info.id,
                    error = %commit_err,
                    "Commit failed; connection discarded"
                );
                conn.discard();
                Err(commit_err)
            }
        }
    }

    /// Roll back the open transaction.
    pub async fn rollback(&mut self, connections: &mut ConnectionContext) -> DbResult<()> {
        let (info, mut conn) = self.finish(connections, "roll back")?;
        self.state = TransactionState::RolledBack;

        match run_control(&mut conn, "ROLLBACK").await {
            Ok(()) => {
                info!(
                    transaction_id = %info.id,
                    duration_secs = info.elapsed_secs(),
                    "Transaction rolled back"
                );
                drop(conn);
                Ok(())
            }
            Err(e) => {
                conn.discard();
                Err(e)
            }
        }
    }

    /// Give up an open transaction without talking to the engine. Used when
    /// its owner goes away; the connection is closed, which ends the
    /// transaction server-side.
    pub fn abandon(&mut self, connections: &mut ConnectionContext) {
        if let Some(info) = self.current.take() {
            warn!(
                transaction_id = %info.id,
                "Active transaction abandoned; discarding its connection"
            );
            connections.discard();
            self.state = TransactionState::RolledBack;
        }
    }

    /// Leave `Active`, emptying the connection slot.
    fn finish(
        &mut self,
        connections: &mut ConnectionContext,
        action: &str,
    ) -> DbResult<(TransactionInfo, DbConnection)> {
        if !self.is_active() {
            return Err(DbError::transaction(
                format!("Cannot {}: no transaction is active", action),
                self.state,
            ));
        }
        let info = self.current.take();
        let conn = connections.take();
        match (info, conn) {
            (Some(info), Some(conn)) => Ok((info, conn)),
            (_, conn) => {
                if let Some(conn) = conn {
                    conn.discard();
                }
                self.state = TransactionState::RolledBack;
                Err(DbError::transaction(
                    format!("Cannot {}: the transaction lost its connection", action),
                    TransactionState::Active,
                ))
            }
        }
    }
}

async fn run_control(conn: &mut DbConnection, statement: &str) -> DbResult<()> {
    use sqlx::Executor;

    let result = impl_db_dispatch!(DbConnection, conn, {
        MySql(c) => (&mut **c).execute(statement).await.map(|_| ()),
        Postgres(c) => (&mut **c).execute(statement).await.map(|_| ()),
        SQLite(c) => (&mut **c).execute(statement).await.map(|_| ()),
    });
    result.map_err(|e| DbError::statement(format!("{} failed", statement), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32);
        assert_ne!(id, generate_transaction_id());
    }

    #[tokio::test]
    async fn test_commit_without_begin() {
        let mut manager = TransactionManager::new();
        let mut connections = ConnectionContext::new();
        let err = manager.commit(&mut connections).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Transaction {
                state: TransactionState::Idle,
                ..
            }
        ));
        assert!(manager.rollback(&mut connections).await.is_err());
        assert_eq!(manager.state(), TransactionState::Idle);
    }

    #[test]
    fn test_abandon_when_idle_is_noop() {
        let mut manager = TransactionManager::new();
        let mut connections = ConnectionContext::new();
        manager.abandon(&mut connections);
        assert_eq!(manager.state(), TransactionState::Idle);
    }
}
