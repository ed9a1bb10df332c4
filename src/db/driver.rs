//! Driver resolution.
//!
//! Engines are compiled in, so "loading" a driver means resolving a configured
//! driver name or URL scheme to a `DatabaseType` and recording that it is in
//! use. Names are accepted as engine names or as JDBC driver class names.

use crate::config::DataSourceConfig;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

struct KnownDriver {
    names: &'static [&'static str],
    /// None for recognised engines this build cannot talk to.
    engine: Option<DatabaseType>,
    label: &'static str,
}

const KNOWN_DRIVERS: &[KnownDriver] = &[
    KnownDriver {
        names: &["sqlite", "sqlite3", "org.sqlite.JDBC"],
        engine: Some(DatabaseType::SQLite),
        label: "SQLite",
    },
    KnownDriver {
        names: &["postgres", "postgresql", "org.postgresql.Driver"],
        engine: Some(DatabaseType::PostgreSQL),
        label: "PostgreSQL",
    },
    KnownDriver {
        names: &["mysql", "com.mysql.cj.jdbc.Driver", "com.mysql.jdbc.Driver"],
        engine: Some(DatabaseType::MySQL),
        label: "MySQL",
    },
    KnownDriver {
        names: &["mariadb", "org.mariadb.jdbc.Driver"],
        engine: Some(DatabaseType::MySQL),
        label: "MariaDB",
    },
    KnownDriver {
        names: &["h2", "org.h2.Driver"],
        engine: None,
        label: "H2",
    },
    KnownDriver {
        names: &["oracle", "oracle.jdbc.OracleDriver", "oracle.jdbc.driver.OracleDriver"],
        engine: None,
        label: "Oracle",
    },
    KnownDriver {
        names: &["sqlserver", "mssql", "com.microsoft.sqlserver.jdbc.SQLServerDriver"],
        engine: None,
        label: "SQL Server",
    },
];

fn lookup(name: &str) -> Option<&'static KnownDriver> {
    let name = name.trim();
    KNOWN_DRIVERS
        .iter()
        .find(|d| d.names.iter().any(|n| n.eq_ignore_ascii_case(name)))
}

/// Resolves drivers and remembers which ones are loaded.
#[derive(Debug, Default)]
pub struct DriverLoader {
    loaded: Mutex<HashSet<DatabaseType>>,
}

impl DriverLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a driver name to an engine without loading it.
    pub fn resolve(name: &str) -> DbResult<DatabaseType> {
        match lookup(name) {
            Some(KnownDriver {
                engine: Some(engine),
                ..
            }) => Ok(*engine),
            Some(KnownDriver { label, .. }) => Err(DbError::configuration(format!(
                "{} databases are not supported by this build; supported engines are SQLite, PostgreSQL and MySQL/MariaDB",
                label
            ))),
            None => Err(DbError::configuration(format!(
                "Unknown database driver '{}'",
                name
            ))),
        }
    }

    /// Resolve the engine for a data source and mark its driver loaded.
    ///
    /// An explicit driver must agree with the URL scheme when the scheme names
    /// an engine.
    pub fn load_driver(&self, config: &DataSourceConfig) -> DbResult<DatabaseType> {
        let from_url = DatabaseType::from_connection_string(&config.url);
        let engine = match (&config.driver, from_url) {
            (Some(driver), from_url) => {
                let engine = Self::resolve(driver)?;
                if let Some(scheme_engine) = from_url {
                    if scheme_engine != engine {
                        return Err(DbError::configuration(format!(
                            "Driver '{}' does not match a {} connection URL",
                            driver, scheme_engine
                        )));
                    }
                }
                engine
            }
            (None, Some(engine)) => engine,
            (None, None) => {
                let scheme = config.url.split(':').next().unwrap_or_default();
                Self::resolve(scheme)?;
                return Err(DbError::configuration(format!(
                    "Cannot determine the driver for URL scheme '{}'; set the driver explicitly",
                    scheme
                )));
            }
        };

        let newly_loaded = self
            .loaded
            .lock()
            .map(|mut loaded| loaded.insert(engine))
            .unwrap_or(false);
        if newly_loaded {
            info!(db_type = %engine, "Database driver loaded");
        }
        Ok(engine)
    }

    /// Whether the engine behind `name` has been loaded.
    pub fn is_driver_loaded(&self, name: &str) -> bool {
        let Ok(engine) = Self::resolve(name) else {
            return false;
        };
        self.loaded
            .lock()
            .map(|loaded| loaded.contains(&engine))
            .unwrap_or(false)
    }
}
