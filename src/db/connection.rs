//! Live connections and the per-unit-of-work connection slot.

use crate::models::DatabaseType;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlConnection, PgConnection, Postgres, Sqlite, SqliteConnection};
use tracing::debug;

/// A connection checked out of an engine-specific pool.
#[derive(Debug)]
pub enum DbConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

/// Borrowed engine connection handed to `Template::execute_with` callbacks.
#[derive(Debug)]
pub enum RawConnection<'c> {
    MySql(&'c mut MySqlConnection),
    Postgres(&'c mut PgConnection),
    SQLite(&'c mut SqliteConnection),
}

impl DbConnection {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub fn raw(&mut self) -> RawConnection<'_> {
        match self {
            DbConnection::MySql(c) => RawConnection::MySql(&mut **c),
            DbConnection::Postgres(c) => RawConnection::Postgres(&mut **c),
            DbConnection::SQLite(c) => RawConnection::SQLite(&mut **c),
        }
    }

    /// Remove the connection from its pool. Dropping the detached connection
    /// closes it, so its session state can never reach another unit of work.
    pub fn discard(self) {
        match self {
            DbConnection::MySql(c) => drop(c.detach()),
            DbConnection::Postgres(c) => drop(c.detach()),
            DbConnection::SQLite(c) => drop(c.detach()),
        }
    }
}

impl RawConnection<'_> {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            RawConnection::MySql(_) => DatabaseType::MySQL,
            RawConnection::Postgres(_) => DatabaseType::PostgreSQL,
            RawConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// Single-slot holder of the live connection of one logical unit of work.
///
/// At most one connection is held; acquiring while one is held reuses it.
#[derive(Debug, Default)]
pub struct ConnectionContext {
    connection: Option<DbConnection>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn db_type(&self) -> Option<DatabaseType> {
        self.connection.as_ref().map(DbConnection::db_type)
    }

    /// The held connection, if any.
    pub fn current(&mut self) -> Option<&mut DbConnection> {
        self.connection.as_mut()
    }

    /// Hold `connection` unless one is already held; returns the held one.
    pub fn bind(&mut self, connection: DbConnection) -> &mut DbConnection {
        self.connection.get_or_insert(connection)
    }

    /// Empty the slot, handing the connection to the caller.
    pub fn take(&mut self) -> Option<DbConnection> {
        self.connection.take()
    }

    /// Empty the slot; the connection goes back to its pool.
    pub fn clear(&mut self) {
        if self.connection.take().is_some() {
            debug!("Connection returned to pool");
        }
    }

    /// Empty the slot; the connection is closed instead of being pooled.
    pub fn discard(&mut self) {
        if let Some(conn) = self.connection.take() {
            debug!(db_type = %conn.db_type(), "Connection discarded");
            conn.discard();
        }
    }
}
