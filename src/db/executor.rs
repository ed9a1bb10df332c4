//! Statement execution on a held connection.
//!
//! The executor uses engine-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and execute
//! - `postgres`: PostgreSQL-specific fetch and execute
//! - `sqlite`: SQLite-specific fetch and execute
//!
//! Each submodule provides identical functionality adapted to the engine's
//! type system. Statements without parameters are sent unprepared.

use crate::db::connection::DbConnection;
use crate::db::types::DecodeRow;
use crate::error::{DbError, DbResult};
use crate::models::{Row, SqlValue};
use tracing::debug;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    pub rows_affected: u64,
    /// Engine-reported last insert id (SQLite rowid, MySQL AUTO_INCREMENT).
    pub last_insert_id: Option<i64>,
}

/// Run a statement and decode all of its rows.
pub async fn fetch_rows(
    conn: &mut DbConnection,
    sql: &str,
    params: &[SqlValue],
) -> DbResult<Vec<Row>> {
    debug!(sql = %sql, params = params.len(), "Executing query");

    let rows = impl_db_dispatch!(DbConnection, conn, {
        MySql(c) => mysql::fetch_rows(c, sql, params).await?,
        Postgres(c) => postgres::fetch_rows(c, sql, params).await?,
        SQLite(c) => sqlite::fetch_rows(c, sql, params).await?,
    });

    debug!(rows = rows.len(), "Query returned rows");
    Ok(rows)
}

/// Run a statement that does not return rows.
pub async fn execute(
    conn: &mut DbConnection,
    sql: &str,
    params: &[SqlValue],
) -> DbResult<Executed> {
    debug!(sql = %sql, params = params.len(), "Executing statement");

    let executed = impl_db_dispatch!(DbConnection, conn, {
        MySql(c) => mysql::execute(c, sql, params).await?,
        Postgres(c) => postgres::execute(c, sql, params).await?,
        SQLite(c) => sqlite::execute(c, sql, params).await?,
    });

    debug!(rows_affected = executed.rows_affected, "Statement executed");
    Ok(executed)
}

/// Run raw SQL, possibly several statements, without preparing it.
pub async fn execute_script(conn: &mut DbConnection, sql: &str) -> DbResult<u64> {
    use sqlx::Executor;

    debug!(sql = %sql, "Executing script");
    let result = impl_db_dispatch!(DbConnection, conn, {
        MySql(c) => (&mut **c).execute(sql).await.map(|r| r.rows_affected()),
        Postgres(c) => (&mut **c).execute(sql).await.map(|r| r.rows_affected()),
        SQLite(c) => (&mut **c).execute(sql).await.map(|r| r.rows_affected()),
    });
    result.map_err(|e| DbError::statement("Failed to execute statement", e))
}

fn query_failed(e: sqlx::Error) -> DbError {
    DbError::statement("Failed to execute query", e)
}

fn statement_failed(e: sqlx::Error) -> DbError {
    DbError::statement("Failed to execute statement", e)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its engine.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::MySqlConnection;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Vec<Row>> {
        let rows: Vec<MySqlRow> = if params.is_empty() {
            use sqlx::Executor;
            conn.fetch_all(sql).await.map_err(query_failed)?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.fetch_all(&mut *conn).await.map_err(query_failed)?
        };
        Ok(rows.iter().map(DecodeRow::to_row).collect())
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Executed> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            conn.execute(sql).await.map_err(statement_failed)?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(&mut *conn).await.map_err(statement_failed)?
        };
        Ok(Executed {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id()).ok(),
        })
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::PgConnection;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Vec<Row>> {
        let rows: Vec<PgRow> = if params.is_empty() {
            use sqlx::Executor;
            conn.fetch_all(sql).await.map_err(query_failed)?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.fetch_all(&mut *conn).await.map_err(query_failed)?
        };
        Ok(rows.iter().map(DecodeRow::to_row).collect())
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Executed> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            conn.execute(sql).await.map_err(statement_failed)?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(&mut *conn).await.map_err(statement_failed)?
        };
        // PostgreSQL reports generated keys only through RETURNING
        Ok(Executed {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::SqliteConnection;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Vec<Row>> {
        let rows: Vec<SqliteRow> = if params.is_empty() {
            use sqlx::Executor;
            conn.fetch_all(sql).await.map_err(query_failed)?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.fetch_all(&mut *conn).await.map_err(query_failed)?
        };
        Ok(rows.iter().map(DecodeRow::to_row).collect())
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Executed> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            conn.execute(sql).await.map_err(statement_failed)?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(&mut *conn).await.map_err(statement_failed)?
        };
        Ok(Executed {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }
}
