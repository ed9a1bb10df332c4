//! Database access layer.
//!
//! - Engine dispatch macro
//! - Driver resolution and per-data-source connection pools
//! - Connection slot and transaction state of one unit of work
//! - Named parameter rewriting, statement execution and row decoding
//! - The `Session` execution context, its `Template` and the
//!   `TransactionRunner`

#[macro_use]
pub mod macros;
pub mod connection;
pub mod context;
pub mod datasource;
pub mod driver;
pub mod executor;
pub mod named;
pub mod params;
pub mod runner;
pub mod session;
pub mod template;
pub mod transaction;
pub mod types;

pub use connection::{ConnectionContext, DbConnection, RawConnection};
pub use context::ConfigurationContext;
pub use datasource::{DataSourceManager, DbPool};
pub use driver::DriverLoader;
pub use executor::Executed;
pub use named::ParsedSql;
pub use params::ParameterSource;
pub use runner::TransactionRunner;
pub use session::Session;
pub use template::Template;
pub use transaction::TransactionManager;
