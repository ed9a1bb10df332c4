//! Database-agnostic type mappings.
//!
//! Decoding a result row into a `Row` uses a two-phase approach:
//! 1. `TypeCategory` classifies the column type into a logical category
//! 2. Engine-specific decoders extract the value as a `SqlValue`
//!
//! SQLite is dynamically typed, so its decoder classifies by the storage
//! class of each value rather than by the declared column type.

use crate::models::{DatabaseType, Row, SqlValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity is not a fixed-point type
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.starts_with("timestamp")
        || lower == "datetime"
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
        || lower == "interval"
    {
        return TypeCategory::Temporal;
    }

    if (lower.contains("int") && lower != "point") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

fn float_value(v: f64) -> SqlValue {
    SqlValue::Float(v)
}

fn decoded<T, E: std::fmt::Display>(
    result: Result<T, E>,
    what: &str,
    convert: impl FnOnce(T) -> SqlValue,
) -> SqlValue {
    match result {
        Ok(v) => convert(v),
        Err(e) => {
            tracing::error!(column_type = what, error = %e, "Failed to decode column");
            SqlValue::Null
        }
    }
}

/// Conversion of an engine row into a `Row`.
pub trait DecodeRow {
    fn to_row(&self) -> Row;
}

impl DecodeRow for MySqlRow {
    fn to_row(&self) -> Row {
        let mut columns = Vec::with_capacity(self.columns().len());
        let mut values = Vec::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::MySQL);
            columns.push(col.name().to_string());
            values.push(mysql::decode_column(self, idx, type_name, category));
        }
        Row::new(columns, values)
    }
}

impl DecodeRow for PgRow {
    fn to_row(&self) -> Row {
        let mut columns = Vec::with_capacity(self.columns().len());
        let mut values = Vec::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::PostgreSQL);
            columns.push(col.name().to_string());
            values.push(postgres::decode_column(self, idx, type_name, category));
        }
        Row::new(columns, values)
    }
}

impl DecodeRow for SqliteRow {
    fn to_row(&self) -> Row {
        let mut columns = Vec::with_capacity(self.columns().len());
        let mut values = Vec::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
            columns.push(col.name().to_string());
            values.push(sqlite::decode_column(self, idx, declared));
        }
        Row::new(columns, values)
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> SqlValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return SqlValue::Null;
        }
        match category {
            TypeCategory::Decimal => {
                decoded(row.try_get::<Decimal, _>(idx), type_name, |v| {
                    SqlValue::Text(v.to_string())
                })
            }
            TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Boolean => decoded(row.try_get::<bool, _>(idx), type_name, SqlValue::Bool),
            TypeCategory::Float => decode_float(row, idx, type_name),
            TypeCategory::Binary => decoded(row.try_get::<Vec<u8>, _>(idx), type_name, SqlValue::Bytes),
            TypeCategory::Json => decoded(row.try_get::<JsonValue, _>(idx), type_name, SqlValue::Json),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return SqlValue::Int(v);
        }
        // BIGINT UNSIGNED beyond i64 range is kept exact as text
        decoded(row.try_get::<u64, _>(idx), type_name, |v| match i64::try_from(v) {
            Ok(v) => SqlValue::Int(v),
            Err(_) => SqlValue::Text(v.to_string()),
        })
    }

    fn decode_float(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return float_value(v);
        }
        decoded(row.try_get::<f32, _>(idx), type_name, |v| float_value(v as f64))
    }

    fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
        match type_name.to_lowercase().as_str() {
            "date" => {
                if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
                    return SqlValue::Text(v.to_string());
                }
            }
            "time" => {
                if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
                    return SqlValue::Text(v.to_string());
                }
            }
            _ => {
                if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
                    return SqlValue::Text(v.format(DATETIME_FORMAT).to_string());
                }
            }
        }
        decode_text(row, idx, type_name)
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return SqlValue::Text(v);
        }
        decoded(row.try_get_unchecked::<String, _>(idx), type_name, SqlValue::Text)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> SqlValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return SqlValue::Null;
        }
        match category {
            TypeCategory::Decimal => {
                decoded(row.try_get::<Decimal, _>(idx), type_name, |v| {
                    SqlValue::Text(v.to_string())
                })
            }
            TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Boolean => decoded(row.try_get::<bool, _>(idx), type_name, SqlValue::Bool),
            TypeCategory::Float => decode_float(row, idx, type_name),
            TypeCategory::Binary => decoded(row.try_get::<Vec<u8>, _>(idx), type_name, SqlValue::Bytes),
            TypeCategory::Json => decoded(row.try_get::<JsonValue, _>(idx), type_name, SqlValue::Json),
            TypeCategory::Uuid => decoded(row.try_get::<uuid::Uuid, _>(idx), type_name, |v| {
                SqlValue::Text(v.to_string())
            }),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize, type_name: &str) -> SqlValue {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return SqlValue::Int(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return SqlValue::Int(v.into());
        }
        decoded(row.try_get::<i16, _>(idx), type_name, |v| SqlValue::Int(v.into()))
    }

    fn decode_float(row: &PgRow, idx: usize, type_name: &str) -> SqlValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return float_value(v);
        }
        decoded(row.try_get::<f32, _>(idx), type_name, |v| float_value(v as f64))
    }

    fn decode_temporal(row: &PgRow, idx: usize, type_name: &str) -> SqlValue {
        match type_name.to_lowercase().as_str() {
            "timestamptz" => {
                if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
                    return SqlValue::Text(v.to_rfc3339());
                }
            }
            "timestamp" => {
                if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
                    return SqlValue::Text(v.format(DATETIME_FORMAT).to_string());
                }
            }
            "date" => {
                if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
                    return SqlValue::Text(v.to_string());
                }
            }
            "time" => {
                if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
                    return SqlValue::Text(v.to_string());
                }
            }
            _ => {}
        }
        decode_text(row, idx, type_name)
    }

    fn decode_text(row: &PgRow, idx: usize, type_name: &str) -> SqlValue {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return SqlValue::Text(v);
        }
        decoded(row.try_get_unchecked::<String, _>(idx), type_name, SqlValue::Text)
    }
}

mod sqlite {
    use super::*;

    /// Decode by storage class. A declared BOOLEAN column holding an integer
    /// decodes as a boolean; a declared JSON column holding text is parsed.
    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> SqlValue {
        let storage = match row.try_get_raw(idx) {
            Ok(value) if value.is_null() => return SqlValue::Null,
            Ok(value) => value.type_info().name().to_uppercase(),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to read SQLite value");
                return SqlValue::Null;
            }
        };

        match storage.as_str() {
            "INTEGER" => decoded(row.try_get_unchecked::<i64, _>(idx), "INTEGER", |v| {
                if declared == TypeCategory::Boolean {
                    SqlValue::Bool(v != 0)
                } else {
                    SqlValue::Int(v)
                }
            }),
            "REAL" => decoded(row.try_get_unchecked::<f64, _>(idx), "REAL", float_value),
            "BLOB" => decoded(row.try_get_unchecked::<Vec<u8>, _>(idx), "BLOB", SqlValue::Bytes),
            _ => decoded(row.try_get_unchecked::<String, _>(idx), "TEXT", |v| {
                if declared == TypeCategory::Json {
                    if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                        return SqlValue::Json(json);
                    }
                }
                SqlValue::Text(v)
            }),
        }
    }
}
