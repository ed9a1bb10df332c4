//! Parameter values and binding.
//!
//! `ParameterSource` carries named parameters for one statement. The `bind_*`
//! functions attach `SqlValue`s to engine-specific query objects.

use crate::error::{DbError, DbResult};
use crate::models::SqlValue;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use std::collections::HashMap;

/// Named parameter values for one statement. Names are unique; adding a name
/// twice replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSource {
    values: HashMap<String, SqlValue>,
}

impl ParameterSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn add_value(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// One parameter per field of a value that serializes as a map or struct.
    ///
    /// Nested arrays and objects become JSON parameters.
    pub fn from_serialize<T: Serialize>(value: &T) -> DbResult<Self> {
        let json = serde_json::to_value(value)
            .map_err(|e| DbError::execution_with(format!("Cannot read parameters: {}", e), e))?;
        match json {
            JsonValue::Object(fields) => Ok(fields
                .into_iter()
                .map(|(name, field)| (name, field_param(field)))
                .collect()),
            other => Err(DbError::execution(format!(
                "Named parameters need a struct or map, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn field_param(value: JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(v) => SqlValue::Bool(v),
        JsonValue::Number(n) => match n.as_i64() {
            Some(v) => SqlValue::Int(v),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Float),
        },
        JsonValue::String(v) => SqlValue::Text(v),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => SqlValue::Json(nested),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a sequence",
        JsonValue::Object(_) => "a map",
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterSource
where
    K: Into<String>,
    V: Into<SqlValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut source = Self::new();
        for (name, value) in iter {
            source.insert(name, value);
        }
        source
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        // SQLite doesn't have native JSON type, store as string
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serialize_struct() {
        #[derive(Serialize)]
        struct Account {
            owner: &'static str,
            balance: i64,
            rate: f64,
            active: bool,
            note: Option<String>,
            tags: Vec<&'static str>,
        }

        let source = ParameterSource::from_serialize(&Account {
            owner: "alice",
            balance: 100,
            rate: 0.5,
            active: true,
            note: None,
            tags: vec!["vip"],
        })
        .unwrap();

        assert_eq!(source.len(), 6);
        assert_eq!(source.get("owner"), Some(&SqlValue::Text("alice".into())));
        assert_eq!(source.get("balance"), Some(&SqlValue::Int(100)));
        assert_eq!(source.get("rate"), Some(&SqlValue::Float(0.5)));
        assert_eq!(source.get("active"), Some(&SqlValue::Bool(true)));
        assert_eq!(source.get("note"), Some(&SqlValue::Null));
        assert_eq!(
            source.get("tags"),
            Some(&SqlValue::Json(serde_json::json!(["vip"])))
        );
    }

    #[test]
    fn test_from_serialize_rejects_scalars() {
        let err = ParameterSource::from_serialize(&42).unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().contains("a number"));

        let map: HashMap<&str, i64> = [("id", 1)].into_iter().collect();
        let source = ParameterSource::from_serialize(&map).unwrap();
        assert_eq!(source.get("id"), Some(&SqlValue::Int(1)));
    }

    #[test]
    fn test_add_value_replaces() {
        let source = ParameterSource::new()
            .add_value("id", 1)
            .add_value("name", "ada")
            .add_value("id", 2);
        assert_eq!(source.len(), 2);
        assert_eq!(source.get("id"), Some(&SqlValue::Int(2)));
        assert!(source.has_value("name"));
        assert!(!source.has_value("missing"));
    }

    #[test]
    fn test_from_iterator() {
        let source: ParameterSource = [("a", 1), ("b", 2)].into_iter().collect();
        let mut names: Vec<_> = source.names().collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
