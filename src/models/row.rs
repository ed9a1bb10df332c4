//! Decoded result rows.

use crate::error::{DbError, DbResult};
use crate::models::value::{FromSqlValue, SqlValue};
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value as JsonValue};

/// One result row: column names and decoded values in select-list order.
///
/// Duplicate column names are kept; lookups by name return the first match.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

/// Column lookup key: zero-based position or column name.
pub trait ColumnIndex {
    fn position(&self, row: &Row) -> DbResult<usize>;
}

impl ColumnIndex for usize {
    fn position(&self, row: &Row) -> DbResult<usize> {
        if *self < row.len() {
            Ok(*self)
        } else {
            Err(DbError::execution(format!(
                "Column index {} out of range for row with {} columns",
                self,
                row.len()
            )))
        }
    }
}

impl ColumnIndex for &str {
    fn position(&self, row: &Row) -> DbResult<usize> {
        row.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(self))
            .ok_or_else(|| DbError::execution(format!("No column named '{}' in result", self)))
    }
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Raw value of a column.
    pub fn value<I: ColumnIndex>(&self, index: I) -> DbResult<&SqlValue> {
        let pos = index.position(self)?;
        Ok(&self.values[pos])
    }

    /// Value of a column coerced to `T`.
    pub fn get<T: FromSqlValue, I: ColumnIndex>(&self, index: I) -> DbResult<T> {
        let pos = index.position(self)?;
        T::from_sql_value(self.values[pos].clone()).map_err(|e| match e {
            DbError::Execution {
                message, source, ..
            } => DbError::Execution {
                message: format!("Column '{}': {}", self.columns[pos], message),
                sql_state: None,
                source,
            },
            other => other,
        })
    }

    /// Iterate over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Map the row onto a type whose fields are named after the columns.
    ///
    /// Binary columns map to byte sequences and non-finite floats to null.
    /// With duplicate column names the first one wins.
    pub fn deserialize<T: DeserializeOwned>(&self) -> DbResult<T> {
        let mut object = Map::with_capacity(self.len());
        for (column, value) in self.iter() {
            if !object.contains_key(column) {
                object.insert(column.to_string(), field_value(value));
            }
        }
        serde_json::from_value(JsonValue::Object(object)).map_err(|e| {
            DbError::execution_with(
                format!("Cannot map row to {}: {}", std::any::type_name::<T>(), e),
                e,
            )
        })
    }
}

fn field_value(value: &SqlValue) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Bool(v) => JsonValue::Bool(*v),
        SqlValue::Int(v) => JsonValue::from(*v),
        SqlValue::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        SqlValue::Text(v) => JsonValue::String(v.clone()),
        SqlValue::Bytes(v) => JsonValue::Array(v.iter().map(|b| JsonValue::from(*b)).collect()),
        SqlValue::Json(v) => v.clone(),
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(
            vec!["id".into(), "name".into(), "score".into()],
            vec![
                SqlValue::Int(7),
                SqlValue::Text("ada".into()),
                SqlValue::Null,
            ],
        )
    }

    #[test]
    fn test_get_by_index_and_name() {
        let row = sample();
        assert_eq!(row.get::<i64, _>(0).unwrap(), 7);
        assert_eq!(row.get::<String, _>("NAME").unwrap(), "ada");
        assert_eq!(row.get::<Option<f64>, _>("score").unwrap(), None);
    }

    #[test]
    fn test_deserialize_into_struct() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Player {
            id: i64,
            name: String,
            score: Option<f64>,
        }

        let player: Player = sample().deserialize().unwrap();
        assert_eq!(
            player,
            Player {
                id: 7,
                name: "ada".into(),
                score: None
            }
        );
    }

    #[test]
    fn test_deserialize_mismatch_is_execution_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Wrong {
            name: i64,
        }

        let err = sample().deserialize::<Wrong>().unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().contains("Wrong"));
    }

    #[test]
    fn test_deserialize_bytes_and_duplicates() {
        #[derive(Debug, serde::Deserialize)]
        struct Blob {
            id: i64,
            data: Vec<u8>,
        }

        let row = Row::new(
            vec!["id".into(), "data".into(), "id".into()],
            vec![
                SqlValue::Int(1),
                SqlValue::Bytes(vec![0, 255]),
                SqlValue::Int(2),
            ],
        );
        let blob: Blob = row.deserialize().unwrap();
        assert_eq!(blob.id, 1);
        assert_eq!(blob.data, vec![0, 255]);
    }

    #[test]
    fn test_missing_column() {
        let row = sample();
        assert!(row.get::<i64, _>(5).unwrap_err().is_execution());
        assert!(row.get::<i64, _>("nope").unwrap_err().is_execution());
    }

    #[test]
    fn test_coercion_error_names_column() {
        let row = sample();
        let err = row.get::<i64, _>("score").unwrap_err();
        assert!(err.to_string().contains("Column 'score'"));
    }

    #[test]
    fn test_serializes_in_column_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"id":7,"name":"ada","score":null}"#);
    }
}
