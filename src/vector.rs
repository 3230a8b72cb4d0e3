//! Embedding values and distance metrics.

use crate::error::InputError;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dense f32 vector as stored in a MariaDB `VECTOR(N)` column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> std::result::Result<Self, InputError> {
        if values.is_empty() || values.iter().any(|value| !value.is_finite()) {
            return Err(InputError::InvalidEmbedding);
        }
        Ok(Self(values))
    }

    /// Parse a JSON array such as `[0.1, 0.2, 0.3]`.
    pub fn parse(argument: &'static str, text: &str) -> std::result::Result<Self, InputError> {
        let value: Value =
            serde_json::from_str(text).map_err(|error| InputError::json(argument, error))?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> std::result::Result<Self, InputError> {
        let Value::Array(items) = value else {
            return Err(InputError::InvalidEmbedding);
        };
        let values = items
            .iter()
            .map(|item| item.as_f64().map(|number| number as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or(InputError::InvalidEmbedding)?;
        Self::new(values)
    }

    /// Decode the on-disk representation: packed little-endian f32.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self(values))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// Text form accepted by `VEC_FromText()`.
    pub fn to_sql_text(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|value| value.to_string()).collect();
        format!("[{}]", parts.join(","))
    }

    pub fn ensure_dimension(&self, table: &str, expected: usize) -> std::result::Result<(), InputError> {
        if self.dimension() != expected {
            return Err(InputError::DimensionMismatch {
                table: table.to_string(),
                expected,
                actual: self.dimension(),
            });
        }
        Ok(())
    }
}

/// Distance functions supported by MariaDB vector indexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl DistanceMetric {
    /// Keyword used in `VECTOR INDEX ... DISTANCE=`.
    pub fn index_keyword(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "COSINE",
            DistanceMetric::Euclidean => "EUCLIDEAN",
        }
    }

    /// Scalar function computing this distance.
    pub fn function(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "VEC_DISTANCE_COSINE",
            DistanceMetric::Euclidean => "VEC_DISTANCE_EUCLIDEAN",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
        }
    }
}
