//! Table descriptors, records and row selectors.

use crate::error::InputError;
use crate::vector::{DistanceMetric, Embedding};

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Name of the VECTOR column in every table created by diem.
pub const EMBEDDING_COLUMN: &str = "embedding";

/// Column added when no primary key is declared.
pub const DEFAULT_KEY_COLUMN: &str = "id";

const MAX_IDENTIFIER_LEN: usize = 64;

/// A validated SQL identifier (table, column, index or plugin name).
///
/// Identifiers are restricted to `[A-Za-z_][A-Za-z0-9_]*` and always emitted
/// backtick-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(kind: &'static str, value: &str) -> std::result::Result<Self, InputError> {
        let mut chars = value.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || value.len() > MAX_IDENTIFIER_LEN {
            return Err(InputError::InvalidIdentifier {
                kind,
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backtick-quoted form for SQL text.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0)
    }

    pub fn is_embedding(&self) -> bool {
        self.0 == EMBEDDING_COLUMN
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

static COLUMN_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?( [A-Za-z ]+)?$")
        .expect("hardcoded regex")
});

/// A metadata column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: Identifier,
    pub sql_type: String,
}

impl ColumnDef {
    pub fn parse(name: &str, sql_type: &str) -> std::result::Result<Self, InputError> {
        let name = Identifier::parse("column", name)?;
        if name.is_embedding() {
            return Err(InputError::Invalid(format!(
                "`{EMBEDDING_COLUMN}` is reserved for the vector column"
            )));
        }
        let sql_type = sql_type.trim();
        if !COLUMN_TYPE.is_match(sql_type) {
            return Err(InputError::InvalidColumnType {
                column: name.to_string(),
                value: sql_type.to_string(),
            });
        }
        Ok(Self {
            name,
            sql_type: sql_type.to_string(),
        })
    }

    /// Parse a JSON object of `{"column": "SQL TYPE"}` pairs, keeping its order.
    pub fn parse_schema(json: &str) -> std::result::Result<Vec<Self>, InputError> {
        let value: Value =
            serde_json::from_str(json).map_err(|error| InputError::json("--columns", error))?;
        let Value::Object(map) = value else {
            return Err(InputError::Invalid(
                "--columns must be a JSON object of column name to SQL type".into(),
            ));
        };

        map.iter()
            .map(|(name, sql_type)| match sql_type {
                Value::String(sql_type) => ColumnDef::parse(name, sql_type),
                other => Err(InputError::InvalidColumnType {
                    column: name.clone(),
                    value: other.to_string(),
                }),
            })
            .collect()
    }
}

/// Everything needed to create a vector table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: Identifier,
    pub dimension: usize,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<Identifier>,
    pub metric: DistanceMetric,
    pub m: u8,
    pub index_name: Identifier,
}

impl TableSpec {
    pub const DEFAULT_M: u8 = 8;
    pub const DEFAULT_INDEX_NAME: &'static str = "vec_idx";
    /// MariaDB accepts M between 3 and 200.
    pub const M_RANGE: std::ops::RangeInclusive<u8> = 3..=200;
    /// Upper bound MariaDB places on VECTOR(N).
    pub const MAX_DIMENSION: usize = 16_383;

    /// Check cross-field rules that single fields cannot express.
    pub fn validate(&self) -> std::result::Result<(), InputError> {
        if self.dimension == 0 || self.dimension > Self::MAX_DIMENSION {
            return Err(InputError::Invalid(format!(
                "--dim must be between 1 and {}",
                Self::MAX_DIMENSION
            )));
        }
        if !Self::M_RANGE.contains(&self.m) {
            return Err(InputError::Invalid(format!(
                "--m must be between {} and {}",
                Self::M_RANGE.start(),
                Self::M_RANGE.end()
            )));
        }
        if let Some(primary_key) = &self.primary_key
            && !self.columns.iter().any(|column| &column.name == primary_key)
        {
            return Err(InputError::Invalid(format!(
                "primary key `{primary_key}` is not defined in --columns"
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(InputError::Invalid(format!(
                    "column `{}` is declared twice",
                    column.name
                )));
            }
            if self.primary_key.is_none() && column.name.as_str() == DEFAULT_KEY_COLUMN {
                return Err(InputError::Invalid(format!(
                    "column `{DEFAULT_KEY_COLUMN}` is generated automatically; pass --primary-key {DEFAULT_KEY_COLUMN} to declare it yourself"
                )));
            }
        }
        Ok(())
    }
}

/// A scalar bound into a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&Value> for FieldValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(flag) => FieldValue::Bool(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => FieldValue::Int(int),
                None => FieldValue::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(text) => FieldValue::Text(text.clone()),
            // Nested values land in JSON/TEXT columns as serialized JSON.
            Value::Array(_) | Value::Object(_) => FieldValue::Text(value.to_string()),
        }
    }
}

/// Column values for one row, with the vector held apart from metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub embedding: Option<Embedding>,
    pub fields: Vec<(Identifier, FieldValue)>,
}

impl Record {
    /// Parse a `--data` JSON object.
    pub fn from_json(argument: &'static str, json: &str) -> std::result::Result<Self, InputError> {
        let value: Value =
            serde_json::from_str(json).map_err(|error| InputError::json(argument, error))?;
        let Value::Object(map) = value else {
            return Err(InputError::Invalid(format!(
                "{argument} must be a JSON object of column name to value"
            )));
        };

        let mut record = Record::default();
        for (name, value) in &map {
            let column = Identifier::parse("column", name)?;
            if column.is_embedding() {
                record.embedding = Some(Embedding::from_json_value(value)?);
            } else {
                record.fields.push((column, FieldValue::from(value)));
            }
        }
        Ok(record)
    }

    pub fn is_empty(&self) -> bool {
        self.embedding.is_none() && self.fields.is_empty()
    }

    /// The column list in bind order: metadata fields first, then `embedding`.
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.iter().map(|(name, _)| name.as_str()).collect();
        if self.embedding.is_some() {
            names.push(EMBEDDING_COLUMN);
        }
        names
    }
}

/// Which rows an update or delete applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `key IN (...)`.
    Keys {
        column: Identifier,
        values: Vec<FieldValue>,
    },
    /// A raw WHERE clause with `:name` placeholders and their values.
    Where {
        clause: String,
        params: serde_json::Map<String, Value>,
    },
}
