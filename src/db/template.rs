//! Data-access operations on a session's connection.
//!
//! A `Template` borrows its session mutably, so every statement it issues
//! runs on that session's single connection, one after another. The template
//! acquires the connection lazily but never commits or releases it; that is
//! the job of the transaction around it.

use crate::db::connection::{DbConnection, RawConnection};
use crate::db::executor::{self, Executed};
use crate::db::named::{ParsedSql, check_placeholder_count, contains_keyword, parse_named};
use crate::db::params::ParameterSource;
use crate::db::session::Session;
use crate::error::{BoxError, DbError, DbResult};
use crate::models::{DatabaseType, FromSqlValue, Row, SqlValue};
use futures_util::future::BoxFuture;
use tracing::debug;

pub struct Template<'s> {
    session: &'s mut Session,
}

impl<'s> Template<'s> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        Self { session }
    }

    /// Engine of the session's connection, acquiring it if needed.
    pub async fn database_type(&mut self) -> DbResult<DatabaseType> {
        Ok(self.connection().await?.db_type())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Map every row of the result, in result-set order.
    ///
    /// The mapper receives the row and its zero-based position.
    pub async fn query<T, F>(&mut self, sql: &str, params: &[SqlValue], mut mapper: F) -> DbResult<Vec<T>>
    where
        F: FnMut(&Row, usize) -> DbResult<T>,
    {
        let rows = self.fetch(sql, params).await?;
        rows.iter()
            .enumerate()
            .map(|(index, row)| mapper(row, index))
            .collect()
    }

    /// Map the single row of the result.
    ///
    /// Fails with `NotFound` on an empty result and `TooManyRows` when more
    /// than one row comes back.
    pub async fn query_for_object<T, F>(&mut self, sql: &str, params: &[SqlValue], mut mapper: F) -> DbResult<T>
    where
        F: FnMut(&Row, usize) -> DbResult<T>,
    {
        let row = single_row(self.fetch(sql, params).await?)?;
        mapper(&row, 0)
    }

    /// Like [`Template::query_for_object`], but an empty result is `None`.
    pub async fn query_for_optional<T, F>(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        mut mapper: F,
    ) -> DbResult<Option<T>>
    where
        F: FnMut(&Row, usize) -> DbResult<T>,
    {
        match at_most_one_row(self.fetch(sql, params).await?)? {
            Some(row) => mapper(&row, 0).map(Some),
            None => Ok(None),
        }
    }

    pub async fn query_for_list(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        self.fetch(sql, params).await
    }

    /// The single row of the result as a column map.
    pub async fn query_for_map(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Row> {
        single_row(self.fetch(sql, params).await?)
    }

    /// First column of the single row, coerced to `T`.
    pub async fn query_for_value<T: FromSqlValue>(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<T> {
        let row = single_row(self.fetch(sql, params).await?)?;
        row.get::<T, _>(0usize)
    }

    pub async fn query_named<T, F>(&mut self, sql: &str, source: &ParameterSource, mapper: F) -> DbResult<Vec<T>>
    where
        F: FnMut(&Row, usize) -> DbResult<T>,
    {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.query(&sql, &params, mapper).await
    }

    pub async fn query_for_object_named<T, F>(
        &mut self,
        sql: &str,
        source: &ParameterSource,
        mapper: F,
    ) -> DbResult<T>
    where
        F: FnMut(&Row, usize) -> DbResult<T>,
    {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.query_for_object(&sql, &params, mapper).await
    }

    pub async fn query_for_optional_named<T, F>(
        &mut self,
        sql: &str,
        source: &ParameterSource,
        mapper: F,
    ) -> DbResult<Option<T>>
    where
        F: FnMut(&Row, usize) -> DbResult<T>,
    {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.query_for_optional(&sql, &params, mapper).await
    }

    pub async fn query_for_list_named(&mut self, sql: &str, source: &ParameterSource) -> DbResult<Vec<Row>> {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.query_for_list(&sql, &params).await
    }

    pub async fn query_for_map_named(&mut self, sql: &str, source: &ParameterSource) -> DbResult<Row> {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.query_for_map(&sql, &params).await
    }

    pub async fn query_for_value_named<T: FromSqlValue>(
        &mut self,
        sql: &str,
        source: &ParameterSource,
    ) -> DbResult<T> {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.query_for_value(&sql, &params).await
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Run an INSERT / UPDATE / DELETE and return the affected row count.
    pub async fn update(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<u64> {
        Ok(self.run(sql, params).await?.rows_affected)
    }

    pub async fn update_named(&mut self, sql: &str, source: &ParameterSource) -> DbResult<u64> {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.update(&sql, &params).await
    }

    /// Run an INSERT and return the key the engine generated for it.
    ///
    /// A statement with a `RETURNING` clause yields the first column of its
    /// single returned row. On PostgreSQL a `RETURNING *` clause is appended
    /// when absent. Elsewhere the engine's last insert id is used, which
    /// only identifies a single inserted row: inserting several rows fails
    /// with `TooManyRows`.
    pub async fn insert_and_return_key<K: FromSqlValue>(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<K> {
        let db_type = self.database_type().await?;

        if contains_keyword(sql, db_type, "RETURNING") {
            let row = single_row(self.fetch(sql, params).await?)?;
            return row.get::<K, _>(0usize);
        }
        if db_type == DatabaseType::PostgreSQL {
            let returning = format!("{} RETURNING *", strip_terminator(sql));
            let row = single_row(self.fetch(&returning, params).await?)?;
            return row.get::<K, _>(0usize);
        }

        let executed = self.run(sql, params).await?;
        if executed.rows_affected > 1 {
            let actual = usize::try_from(executed.rows_affected).unwrap_or(usize::MAX);
            return Err(DbError::too_many_rows(1, actual));
        }
        match executed.last_insert_id {
            Some(id) if executed.rows_affected > 0 && id != 0 => K::from_sql_value(SqlValue::Int(id)),
            _ => Err(DbError::not_found(format!(
                "No generated key reported ({} row(s) affected)",
                executed.rows_affected
            ))),
        }
    }

    pub async fn insert_and_return_key_named<K: FromSqlValue>(
        &mut self,
        sql: &str,
        source: &ParameterSource,
    ) -> DbResult<K> {
        let (sql, params) = self.resolve_named(sql, source).await?;
        self.insert_and_return_key(&sql, &params).await
    }

    /// Run `sql` once per argument list; counts are returned in input order.
    ///
    /// Every item is validated before the first one is sent. The first
    /// failing item fails the whole call; items already executed are left to
    /// the surrounding transaction.
    pub async fn batch_update(&mut self, sql: &str, batch_args: &[Vec<SqlValue>]) -> DbResult<Vec<u64>> {
        if batch_args.is_empty() {
            return Ok(Vec::new());
        }
        self.run_batch(sql, batch_args).await
    }

    pub async fn batch_update_with_parameter_sources(
        &mut self,
        sql: &str,
        sources: &[ParameterSource],
    ) -> DbResult<Vec<u64>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let parsed = self.parse(sql).await?;
        let batch_args = sources
            .iter()
            .enumerate()
            .map(|(index, source)| parsed.bind(source).map_err(|e| batch_item_failed(index, e)))
            .collect::<DbResult<Vec<_>>>()?;
        self.run_batch(&parsed.sql, &batch_args).await
    }

    // =========================================================================
    // Raw execution
    // =========================================================================

    /// Run SQL without parameters, DDL and multi-statement scripts included.
    pub async fn execute(&mut self, sql: &str) -> DbResult<()> {
        let conn = self.connection().await?;
        executor::execute_script(conn, sql).await?;
        Ok(())
    }

    /// Hand the engine connection to `callback`.
    ///
    /// Any error the callback returns becomes an `Execution` error with the
    /// callback's error as its source.
    pub async fn execute_with<T, E, F>(&mut self, callback: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(RawConnection<'c>) -> BoxFuture<'c, Result<T, E>>,
        E: Into<BoxError>,
    {
        let conn = self.connection().await?;
        callback(conn.raw())
            .await
            .map_err(|e| DbError::execution_with("Connection callback failed", e))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn connection(&mut self) -> DbResult<&mut DbConnection> {
        self.session.connection().await
    }

    async fn parse(&mut self, sql: &str) -> DbResult<ParsedSql> {
        let db_type = self.database_type().await?;
        parse_named(sql, db_type)
    }

    async fn resolve_named(&mut self, sql: &str, source: &ParameterSource) -> DbResult<(String, Vec<SqlValue>)> {
        let parsed = self.parse(sql).await?;
        let params = parsed.bind(source)?;
        Ok((parsed.sql, params))
    }

    async fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        let conn = self.connection().await?;
        check_placeholder_count(sql, conn.db_type(), params.len())?;
        executor::fetch_rows(conn, sql, params).await
    }

    async fn run(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Executed> {
        let conn = self.connection().await?;
        check_placeholder_count(sql, conn.db_type(), params.len())?;
        executor::execute(conn, sql, params).await
    }

    async fn run_batch(&mut self, sql: &str, batch_args: &[Vec<SqlValue>]) -> DbResult<Vec<u64>> {
        let conn = self.connection().await?;
        let db_type = conn.db_type();
        for (index, args) in batch_args.iter().enumerate() {
            check_placeholder_count(sql, db_type, args.len()).map_err(|e| batch_item_failed(index, e))?;
        }

        let mut counts = Vec::with_capacity(batch_args.len());
        for (index, args) in batch_args.iter().enumerate() {
            let executed = executor::execute(conn, sql, args)
                .await
                .map_err(|e| batch_item_failed(index, e))?;
            counts.push(executed.rows_affected);
        }
        debug!(items = counts.len(), "Batch executed");
        Ok(counts)
    }
}

fn single_row(rows: Vec<Row>) -> DbResult<Row> {
    match at_most_one_row(rows)? {
        Some(row) => Ok(row),
        None => Err(DbError::not_found("Expected one row but the query returned none")),
    }
}

fn at_most_one_row(mut rows: Vec<Row>) -> DbResult<Option<Row>> {
    if rows.len() > 1 {
        return Err(DbError::too_many_rows(1, rows.len()));
    }
    Ok(rows.pop())
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim_end().trim_end_matches(';').trim_end()
}

/// Attach the failing item's index, keeping SQLSTATE and cause.
fn batch_item_failed(index: usize, err: DbError) -> DbError {
    match err {
        DbError::Execution {
            message,
            sql_state,
            source,
        } => DbError::Execution {
            message: format!("Batch item {}: {}", index, message),
            sql_state,
            source,
        },
        other => DbError::execution_with(format!("Batch item {} failed", index), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64) -> Row {
        Row::new(vec!["id".to_string()], vec![SqlValue::Int(id)])
    }

    #[test]
    fn test_single_row_rules() {
        assert!(single_row(vec![]).unwrap_err().is_not_found());
        assert_eq!(single_row(vec![row(7)]).unwrap().get::<i64, _>("id").unwrap(), 7);
        match single_row(vec![row(1), row(2), row(3)]).unwrap_err() {
            DbError::TooManyRows { expected, actual } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_at_most_one_row() {
        assert!(at_most_one_row(vec![]).unwrap().is_none());
        assert!(at_most_one_row(vec![row(1)]).unwrap().is_some());
        assert!(at_most_one_row(vec![row(1), row(2)]).unwrap_err().is_too_many_rows());
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator("INSERT INTO t VALUES (1);  \n"), "INSERT INTO t VALUES (1)");
        assert_eq!(strip_terminator("INSERT INTO t VALUES (1)"), "INSERT INTO t VALUES (1)");
    }

    #[test]
    fn test_batch_item_failed_keeps_sql_state() {
        let err = DbError::Execution {
            message: "UNIQUE constraint failed".to_string(),
            sql_state: Some("2067".to_string()),
            source: None,
        };
        let wrapped = batch_item_failed(2, err);
        assert_eq!(wrapped.sql_state(), Some("2067"));
        assert!(wrapped.to_string().contains("Batch item 2: UNIQUE constraint failed"));

        let wrapped = batch_item_failed(0, DbError::not_found("x"));
        assert!(wrapped.is_execution());
        assert!(wrapped.to_string().contains("Batch item 0 failed"));
    }
}
