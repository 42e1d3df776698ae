//! Dynamically typed cell values

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

/// A cell decoded by its runtime storage class, not its declared type
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn decode(row: &SqliteRow, index: usize) -> Result<Self, sqlx::Error> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }

        let storage_class = raw.type_info().name().to_ascii_uppercase();
        let value = match storage_class.as_str() {
            "INTEGER" => SqlValue::Integer(row.try_get(index)?),
            "REAL" => SqlValue::Real(row.try_get(index)?),
            "BLOB" => SqlValue::Blob(row.try_get(index)?),
            _ => SqlValue::Text(row.try_get(index)?),
        };
        Ok(value)
    }

    /// JSON form used in sample rows; blobs become base64 strings
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(v) => Value::from(*v),
            SqlValue::Real(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
            SqlValue::Text(v) => Value::String(v.clone()),
            SqlValue::Blob(v) => Value::String(STANDARD.encode(v)),
        }
    }

    /// Display text used for statistics and reports; `None` for NULL
    pub fn render(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(v.to_string()),
            SqlValue::Text(v) => Some(v.clone()),
            SqlValue::Blob(v) => Some(format!("<blob {} bytes>", v.len())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(v) => Some(*v as f64),
            SqlValue::Real(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

/// Decode every column of a row, in column order
pub(crate) fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|index| SqlValue::decode(row, index)).collect()
}
