//! Error types for the persistence layer.
//!
//! Every failure keeps its cause chain so callers can tell "no such row" from
//! "ambiguous row" from "malformed SQL" by matching on the variant rather than
//! on message text.

use crate::models::TransactionState;
use thiserror::Error;

/// Boxed error used for wrapped causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("No rows found: {message}")]
    NotFound { message: String },

    #[error("Too many rows: expected at most {expected}, got {actual}")]
    TooManyRows { expected: usize, actual: usize },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// Umbrella error produced by the unchecked transaction runner.
    #[error("Persistence error: {source}")]
    Persistence {
        #[source]
        source: BoxError,
    },

    #[error("Transaction error: {message} (state: {state})")]
    Transaction {
        message: String,
        state: TransactionState,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl DbError {
    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a too-many-rows error.
    pub fn too_many_rows(expected: usize, actual: usize) -> Self {
        Self::TooManyRows { expected, actual }
    }

    /// Create an execution error without an underlying cause.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state: None,
            source: None,
        }
    }

    /// Create an execution error wrapping an underlying cause.
    pub fn execution_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state: None,
            source: Some(source.into()),
        }
    }

    /// Wrap any failure in the unchecked umbrella error.
    pub fn persistence(source: impl Into<BoxError>) -> Self {
        Self::Persistence {
            source: source.into(),
        }
    }

    /// Create a transaction state error.
    pub fn transaction(message: impl Into<String>, state: TransactionState) -> Self {
        Self::Transaction {
            message: message.into(),
            state,
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Translate a statement failure. Always yields `Execution`, keeping the
    /// SQLSTATE code when the engine reported one.
    pub fn statement(context: impl Into<String>, err: sqlx::Error) -> Self {
        let context = context.into();
        let (message, sql_state) = match &err {
            sqlx::Error::Database(db_err) => (
                format!("{}: {}", context, db_err.message()),
                db_err.code().map(|c| c.to_string()),
            ),
            other => (format!("{}: {}", context, other), None),
        };
        Self::Execution {
            message,
            sql_state,
            source: Some(Box::new(err)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_too_many_rows(&self) -> bool {
        matches!(self, Self::TooManyRows { .. })
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQLSTATE reported by the engine, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Execution { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// The `DbError` wrapped by a `Persistence` error, if that is what it wraps.
    pub fn persistence_cause(&self) -> Option<&DbError> {
        match self {
            Self::Persistence { source } => source.downcast_ref::<DbError>(),
            _ => None,
        }
    }
}

/// Convert sqlx errors raised outside statement execution (pool, connect).
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::RowNotFound => DbError::not_found("No rows returned"),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a connection from the pool",
                "Increase acquire_timeout or max_connections, or release idle sessions",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reopen the data source")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            other => DbError::statement("Database operation failed", other),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
