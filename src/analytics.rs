//! ColumnStore analytics tables fed from vector tables.

use crate::error::InputError;
use crate::schema::Identifier;

use serde::Serialize;

/// Where the analytics copy takes its `metadata` JSON from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    /// The source table already has a JSON/TEXT column with this name.
    Column(Identifier),
    /// Build `JSON_OBJECT(...)` from these source columns.
    Columns(Vec<Identifier>),
}

/// A source vector table paired with its ColumnStore copy.
#[derive(Debug, Clone)]
pub struct AnalyticsSpec {
    pub source: Identifier,
    pub target: Identifier,
    pub key_column: Identifier,
    /// Declared type of the key column in the source, reused in the target.
    pub key_type: String,
    pub dimension: usize,
    pub metadata: MetadataSource,
}

impl AnalyticsSpec {
    /// `<source>_analytics`, unless that would exceed identifier limits.
    pub fn default_target(source: &Identifier) -> std::result::Result<Identifier, InputError> {
        Identifier::parse("table", &format!("{source}_analytics"))
    }
}

/// Row count for one value of the grouping key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCount {
    pub group: Option<String>,
    pub total: i64,
}

/// Result of `run-analytics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub table: String,
    pub group_by: String,
    pub groups: Vec<GroupCount>,
    pub total: i64,
    pub average_norm: Option<f64>,
}
