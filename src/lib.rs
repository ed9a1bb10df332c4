//! Persistence core.
//!
//! Engine-agnostic data access and transaction coordination over SQLite,
//! PostgreSQL and MySQL: parameterized queries with typed row mapping,
//! named parameters, generated keys, batches, transaction demarcation and
//! propagation of the active persistence configuration to spawned workers.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DataSourceConfig, PoolOptions};
pub use db::{
    ConfigurationContext, DataSourceManager, ParameterSource, RawConnection, Session, Template,
    TransactionRunner,
};
pub use error::{DbError, DbResult};
pub use models::{FromSqlValue, PersistenceConfiguration, Row, SqlValue};
