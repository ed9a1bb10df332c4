//! Engine dispatch macro.
//!
//! Pools and pooled connections are kept as one enum variant per engine so
//! every engine keeps its full type support. This macro writes the repetitive
//! per-variant `match` while keeping each arm readable.

/// Generate match arms over the per-engine variants of a `db` enum.
///
/// The first argument names the enum (`DbPool` or `DbConnection`).
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbConnection, conn, {
///     MySql(c) => mysql::fetch_rows(c, sql, params).await,
///     Postgres(c) => postgres::fetch_rows(c, sql, params).await,
///     SQLite(c) => sqlite::fetch_rows(c, sql, params).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($kind:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $crate::db::$kind::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
