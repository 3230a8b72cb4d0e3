//! Decoding driver rows into JSON objects for display.

use crate::error::Result;
use crate::schema::EMBEDDING_COLUMN;
use crate::vector::Embedding;

use super::session::Row;

use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    DateTime,
    Date,
    Time,
    Json,
    Binary,
    Text,
}

/// Map a driver type name to how its value is decoded. Anything unknown
/// (DECIMAL, ENUM, SET, ...) arrives as text.
pub(crate) fn classify(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOLEAN" => ColumnKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ColumnKind::Signed,
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "YEAR" => ColumnKind::Unsigned,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "JSON" => ColumnKind::Json,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => ColumnKind::Binary,
        _ => ColumnKind::Text,
    }
}

pub fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.name(), column.type_info().name())?;
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

fn decode_column(row: &MySqlRow, index: usize, name: &str, type_name: &str) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    // VECTOR columns have no stable protocol type; recognise them by name.
    if name == EMBEDDING_COLUMN {
        let bytes: Vec<u8> = row.try_get_unchecked(index)?;
        return Ok(embedding_value(&bytes));
    }

    let value = match classify(type_name) {
        ColumnKind::Bool => Value::Bool(row.try_get_unchecked::<bool, _>(index)?),
        ColumnKind::Signed => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        ColumnKind::Unsigned => Value::from(row.try_get_unchecked::<u64, _>(index)?),
        ColumnKind::Float => float_value(row.try_get_unchecked::<f32, _>(index)?),
        ColumnKind::Double => Value::from(row.try_get_unchecked::<f64, _>(index)?),
        ColumnKind::DateTime => Value::String(
            row.try_get_unchecked::<chrono::NaiveDateTime, _>(index)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        ColumnKind::Date => Value::String(
            row.try_get_unchecked::<chrono::NaiveDate, _>(index)?
                .to_string(),
        ),
        ColumnKind::Time => Value::String(
            row.try_get_unchecked::<chrono::NaiveTime, _>(index)?
                .to_string(),
        ),
        ColumnKind::Json => {
            let text: String = row.try_get_unchecked(index)?;
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        ColumnKind::Binary => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            Value::String(hex_literal(&bytes))
        }
        ColumnKind::Text => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
    };
    Ok(value)
}

/// An `embedding` value: VEC_ToText output or packed little-endian f32.
pub(crate) fn embedding_value(bytes: &[u8]) -> Value {
    if let Ok(text) = std::str::from_utf8(bytes)
        && text.trim_start().starts_with('[')
        && let Ok(value @ Value::Array(_)) = serde_json::from_str::<Value>(text)
    {
        return value;
    }
    match Embedding::from_le_bytes(bytes) {
        Some(embedding) => embedding_json(&embedding),
        None => Value::String(hex_literal(bytes)),
    }
}

pub(crate) fn embedding_json(embedding: &Embedding) -> Value {
    Value::Array(embedding.values().iter().copied().map(float_value).collect())
}

/// Widen through the shortest decimal form so `0.1f32` prints as `0.1`.
fn float_value(value: f32) -> Value {
    let widened = value.to_string().parse::<f64>().unwrap_or(f64::from(value));
    Value::from(widened)
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(2 + bytes.len() * 2);
    text.push_str("0x");
    for byte in bytes {
        text.push_str(&format!("{byte:02x}"));
    }
    text
}
