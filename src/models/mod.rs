//! Data models for the persistence layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod persistence;
pub mod row;
pub mod value;

// Re-export commonly used types
pub use connection::{DatabaseType, TransactionInfo, TransactionState};
pub use persistence::PersistenceConfiguration;
pub use row::{ColumnIndex, Row};
pub use value::{FromSqlValue, SqlValue};
