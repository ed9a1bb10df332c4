//! Engine-agnostic SQL values and type coercion.
//!
//! `SqlValue` is used both for bound parameters and for decoded column
//! values. `FromSqlValue` converts a decoded value into a caller-chosen Rust
//! type, widening and parsing where that is lossless.

use crate::error::{DbError, DbResult};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A parameter or column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    Text(String),
    /// Binary data (base64 encoded when serialized)
    #[serde(serialize_with = "base64_bytes::serialize")]
    Bytes(Vec<u8>),
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

macro_rules! impl_from_for_sql_value {
    ($($ty:ty => $variant:ident via $conv:expr),+ $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant($conv(v))
                }
            }
        )+
    };
}

impl_from_for_sql_value! {
    bool => Bool via |v| v,
    i8 => Int via i64::from,
    i16 => Int via i64::from,
    i32 => Int via i64::from,
    i64 => Int via |v| v,
    u8 => Int via i64::from,
    u16 => Int via i64::from,
    u32 => Int via i64::from,
    f32 => Float via f64::from,
    f64 => Float via |v| v,
    String => Text via |v| v,
    &str => Text via String::from,
    Vec<u8> => Bytes via |v| v,
    &[u8] => Bytes via <[u8]>::to_vec,
    JsonValue => Json via |v| v,
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Build a positional parameter list from heterogeneous values.
///
/// ```ignore
/// template.update("UPDATE t SET a = ? WHERE id = ?", &sql_params![1.5, 7]).await?;
/// ```
#[macro_export]
macro_rules! sql_params {
    () => {
        Vec::<$crate::models::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::models::SqlValue::from($value)),+]
    };
}

/// Conversion from a decoded value into a Rust type.
pub trait FromSqlValue: Sized {
    /// Name of the target type used in coercion errors.
    fn target_name() -> &'static str;

    fn from_sql_value(value: SqlValue) -> DbResult<Self>;
}

fn coercion_error<T: FromSqlValue>(value: &SqlValue) -> DbError {
    let shown = match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bytes(b) => format!("{} bytes", b.len()),
        other => format!("{:?}", other),
    };
    DbError::execution(format!(
        "Cannot convert {} value {} to {}",
        value.type_name(),
        shown,
        T::target_name()
    ))
}

impl FromSqlValue for SqlValue {
    fn target_name() -> &'static str {
        "SqlValue"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        Ok(value)
    }
}

impl FromSqlValue for i64 {
    fn target_name() -> &'static str {
        "i64"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        match &value {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Bool(v) => Ok(i64::from(*v)),
            SqlValue::Float(v)
                // i64::MAX as f64 rounds up to 2^63, which is out of range
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 =>
            {
                Ok(*v as i64)
            }
            SqlValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| coercion_error::<i64>(&value)),
            _ => Err(coercion_error::<i64>(&value)),
        }
    }
}

macro_rules! impl_narrow_integer {
    ($($ty:ty),+) => {
        $(
            impl FromSqlValue for $ty {
                fn target_name() -> &'static str {
                    stringify!($ty)
                }

                fn from_sql_value(value: SqlValue) -> DbResult<Self> {
                    let wide = match i64::from_sql_value(value.clone()) {
                        Ok(v) => v,
                        Err(_) => return Err(coercion_error::<$ty>(&value)),
                    };
                    <$ty>::try_from(wide).map_err(|_| coercion_error::<$ty>(&value))
                }
            }
        )+
    };
}

impl_narrow_integer!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromSqlValue for f64 {
    fn target_name() -> &'static str {
        "f64"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        match &value {
            SqlValue::Float(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v as f64),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| coercion_error::<f64>(&value)),
            _ => Err(coercion_error::<f64>(&value)),
        }
    }
}

impl FromSqlValue for f32 {
    fn target_name() -> &'static str {
        "f32"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        f64::from_sql_value(value.clone())
            .map(|v| v as f32)
            .map_err(|_| coercion_error::<f32>(&value))
    }
}

impl FromSqlValue for bool {
    fn target_name() -> &'static str {
        "bool"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        match &value {
            SqlValue::Bool(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v != 0),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(coercion_error::<bool>(&value)),
            },
            _ => Err(coercion_error::<bool>(&value)),
        }
    }
}

impl FromSqlValue for String {
    fn target_name() -> &'static str {
        "String"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        match value {
            SqlValue::Text(s) => Ok(s),
            SqlValue::Int(v) => Ok(v.to_string()),
            SqlValue::Float(v) => Ok(v.to_string()),
            SqlValue::Bool(v) => Ok(v.to_string()),
            SqlValue::Json(v) => Ok(v.to_string()),
            SqlValue::Bytes(b) => {
                String::from_utf8(b).map_err(|e| DbError::execution_with("Cannot convert bytes value to String", e))
            }
            SqlValue::Null => Err(coercion_error::<String>(&SqlValue::Null)),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn target_name() -> &'static str {
        "Vec<u8>"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        match value {
            SqlValue::Bytes(b) => Ok(b),
            SqlValue::Text(s) => Ok(s.into_bytes()),
            other => Err(coercion_error::<Vec<u8>>(&other)),
        }
    }
}

impl FromSqlValue for JsonValue {
    fn target_name() -> &'static str {
        "serde_json::Value"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        match value {
            SqlValue::Json(v) => Ok(v),
            SqlValue::Null => Ok(JsonValue::Null),
            SqlValue::Bool(v) => Ok(JsonValue::Bool(v)),
            SqlValue::Int(v) => Ok(JsonValue::from(v)),
            SqlValue::Float(v) => Ok(serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()))),
            SqlValue::Text(s) => {
                Ok(serde_json::from_str(&s).unwrap_or(JsonValue::String(s)))
            }
            other => Err(coercion_error::<JsonValue>(&other)),
        }
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

impl FromSqlValue for NaiveDateTime {
    fn target_name() -> &'static str {
        "NaiveDateTime"
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        if let SqlValue::Text(s) = &value {
            let trimmed = s.trim().trim_end_matches('Z');
            for format in DATETIME_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                    return Ok(dt);
                }
            }
        }
        Err(coercion_error::<NaiveDateTime>(&value))
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn target_name() -> &'static str {
        T::target_name()
    }

    fn from_sql_value(value: SqlValue) -> DbResult<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}
