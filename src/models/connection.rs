//! Engines and transaction bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engines this crate talks to. MariaDB goes through `MySQL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Engine named by the scheme of a data source URL.
    pub fn from_connection_string(url: &str) -> Option<Self> {
        let (scheme, _) = url.trim().split_once(':')?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Native positional marker for the 1-based parameter `position`.
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", position),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Where a session's transaction manager stands.
///
/// `Committed` and `RolledBack` record the outcome of the last transaction;
/// a new one may be started from either, exactly as from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    #[default]
    Idle,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        })
    }
}

/// The open transaction of a session.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionInfo {
    /// `tx_` followed by a simple-format UUID
    pub id: String,
    pub started_at: DateTime<Utc>,
}

impl TransactionInfo {
    pub fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_url_scheme() {
        let cases = [
            ("postgres://localhost/db", Some(DatabaseType::PostgreSQL)),
            ("PostgreSQL://localhost/db", Some(DatabaseType::PostgreSQL)),
            ("mariadb://localhost/db", Some(DatabaseType::MySQL)),
            ("mysql://root@localhost:3306", Some(DatabaseType::MySQL)),
            ("sqlite:test.db", Some(DatabaseType::SQLite)),
            ("sqlite::memory:", Some(DatabaseType::SQLite)),
            ("sqlitex:test.db", None),
            ("no scheme at all", None),
        ];
        for (url, expected) in cases {
            assert_eq!(DatabaseType::from_connection_string(url), expected, "{url}");
        }
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(DatabaseType::PostgreSQL.placeholder(3), "$3");
        assert_eq!(DatabaseType::MySQL.placeholder(3), "?");
        assert_eq!(DatabaseType::SQLite.placeholder(1), "?");
    }

    #[test]
    fn test_only_active_is_active() {
        let states = [
            TransactionState::Idle,
            TransactionState::Active,
            TransactionState::Committed,
            TransactionState::RolledBack,
        ];
        let active: Vec<_> = states.into_iter().filter(|s| s.is_active()).collect();
        assert_eq!(active, vec![TransactionState::Active]);
        assert_eq!(TransactionState::default(), TransactionState::Idle);
        assert_eq!(TransactionState::RolledBack.to_string(), "rolled_back");
    }
}
