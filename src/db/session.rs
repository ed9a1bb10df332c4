//! Per-worker execution context.
//!
//! A `Session` bundles everything one logical unit of work needs: the
//! configuration context it reads, the connection slot it executes on and the
//! transaction manager demarcating it. It is handed explicitly to every entry
//! point; workers never share one.

use crate::db::connection::{ConnectionContext, DbConnection};
use crate::db::context::ConfigurationContext;
use crate::db::datasource::{DataSourceManager, DbPool};
use crate::db::template::Template;
use crate::db::transaction::TransactionManager;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, PersistenceConfiguration, TransactionInfo, TransactionState};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct Session {
    configuration: ConfigurationContext,
    connections: ConnectionContext,
    transactions: TransactionManager,
    data_sources: Arc<DataSourceManager>,
}

impl Session {
    pub fn new(configuration: ConfigurationContext, data_sources: Arc<DataSourceManager>) -> Self {
        Self {
            configuration,
            connections: ConnectionContext::new(),
            transactions: TransactionManager::new(),
            data_sources,
        }
    }

    /// A session bound to `config`.
    pub fn with_configuration(
        config: impl Into<Arc<PersistenceConfiguration>>,
        data_sources: Arc<DataSourceManager>,
    ) -> Self {
        Self::new(ConfigurationContext::with_configuration(config), data_sources)
    }

    /// A session for a worker: same data sources, a snapshot of this
    /// session's configuration, no connection and no transaction.
    pub fn fork(&self) -> Session {
        Session::new(self.configuration.fork(), Arc::clone(&self.data_sources))
    }

    pub fn configuration(&self) -> &ConfigurationContext {
        &self.configuration
    }

    /// Changing the configuration affects connections acquired afterwards;
    /// a connection already held keeps its data source.
    pub fn configuration_mut(&mut self) -> &mut ConfigurationContext {
        &mut self.configuration
    }

    pub fn data_sources(&self) -> &Arc<DataSourceManager> {
        &self.data_sources
    }

    /// Data-access operations on this session's connection.
    pub fn template(&mut self) -> Template<'_> {
        Template::new(self)
    }

    /// The pool behind the active configuration.
    pub async fn pool(&self) -> DbResult<DbPool> {
        let config = self.configuration.require()?;
        self.data_sources.get_data_source(&config.data_source).await
    }

    /// The connection of this unit of work, acquired from the pool on first
    /// use and held until the transaction ends or it is released.
    pub async fn connection(&mut self) -> DbResult<&mut DbConnection> {
        self.ensure_connection().await?;
        self.connections.current().ok_or_else(empty_slot)
    }

    async fn ensure_connection(&mut self) -> DbResult<()> {
        if !self.connections.has_connection() {
            let conn = self.pool().await?.acquire().await?;
            self.connections.bind(conn);
        }
        Ok(())
    }

    pub fn has_connection(&self) -> bool {
        self.connections.has_connection()
    }

    /// Engine of the held connection, if any.
    pub fn database_type(&self) -> Option<DatabaseType> {
        self.connections.db_type()
    }

    /// Return the held connection to the pool. Inside a transaction the
    /// connection is kept; the transaction's end releases it.
    pub fn release_connection(&mut self) {
        if self.transactions.is_active() {
            debug!("Connection kept: transaction still active");
            return;
        }
        self.connections.clear();
    }

    pub async fn start_transaction(&mut self) -> DbResult<()> {
        self.transactions.ensure_can_start()?;
        self.ensure_connection().await?;
        let conn = self.connections.current().ok_or_else(empty_slot)?;
        self.transactions.begin(conn).await?;
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> DbResult<()> {
        self.transactions.commit(&mut self.connections).await
    }

    pub async fn rollback_transaction(&mut self) -> DbResult<()> {
        self.transactions.rollback(&mut self.connections).await
    }

    /// Drop the active transaction without a round trip, discarding its
    /// connection so the server rolls it back.
    pub(crate) fn abandon_transaction(&mut self) {
        self.transactions.abandon(&mut self.connections);
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transactions.state()
    }

    pub fn current_transaction(&self) -> Option<&TransactionInfo> {
        self.transactions.current()
    }
}

fn empty_slot() -> DbError {
    DbError::connection(
        "Session holds no connection",
        "Check that the data source is reachable",
    )
}

impl Drop for Session {
    fn drop(&mut self) {
        // An open transaction must never reach the pool
        self.abandon_transaction();
    }
}
