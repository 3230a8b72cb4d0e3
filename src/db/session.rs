//! The seam between command handlers and the database.

use crate::analytics::{AnalyticsReport, AnalyticsSpec};
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::schema::{EMBEDDING_COLUMN, Identifier, Record, Selector, TableSpec};
use crate::vector::{DistanceMetric, Embedding};

use serde::Serialize;

/// A result row keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A similarity query.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub table: Identifier,
    pub vector: Embedding,
    pub metric: DistanceMetric,
    pub limit: u32,
}

/// One column as reported by `information_schema.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Full declared type, e.g. `vector(768)` or `bigint(20) unsigned`.
    pub column_type: String,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }

    /// `N` for a `vector(N)` column.
    pub fn vector_dimension(&self) -> Option<usize> {
        let lower = self.column_type.trim().to_ascii_lowercase();
        lower
            .strip_prefix("vector(")?
            .strip_suffix(')')?
            .trim()
            .parse()
            .ok()
    }
}

/// Dimension of the `embedding` column among `columns`.
pub fn embedding_dimension(columns: &[TableColumn]) -> Option<usize> {
    columns
        .iter()
        .find(|column| column.name == EMBEDDING_COLUMN)
        .and_then(TableColumn::vector_dimension)
}

/// A row of `information_schema.ENGINES`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    pub engine: String,
    pub support: String,
    pub comment: Option<String>,
}

/// Parsed `SELECT VERSION()` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerVersion {
    pub raw: String,
    pub major: u32,
    pub minor: u32,
    pub is_mariadb: bool,
}

impl ServerVersion {
    /// First release with the VECTOR type, Spider and ColumnStore all usable together.
    pub const MINIMUM: (u32, u32) = (11, 8);

    pub fn parse(raw: &str) -> Self {
        let mut numbers = raw
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>().unwrap_or(0));
        let major = numbers.next().unwrap_or(0);
        let minor = numbers.next().unwrap_or(0);

        Self {
            raw: raw.to_string(),
            major,
            minor,
            is_mariadb: raw.to_ascii_lowercase().contains("mariadb"),
        }
    }

    pub fn supports_vectors(&self) -> bool {
        self.is_mariadb && (self.major, self.minor) >= Self::MINIMUM
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One open database connection. Every command runs against exactly one
/// session and closes it when done.
#[async_trait::async_trait]
pub trait Session: Send {
    async fn server_version(&mut self) -> Result<ServerVersion>;

    /// Columns of `table` in the current database, or `None` if it does not exist.
    async fn describe_table(&mut self, table: &Identifier) -> Result<Option<Vec<TableColumn>>>;

    async fn create_table(&mut self, spec: &TableSpec) -> Result<()>;

    async fn insert(&mut self, table: &Identifier, record: &Record) -> Result<u64>;

    /// Insert records as they arrive, all in one transaction. An `Err` item or
    /// a failed insert rolls back everything and is returned.
    async fn insert_all(
        &mut self,
        table: &Identifier,
        records: &mut (dyn Iterator<Item = Result<Record>> + Send),
    ) -> Result<u64>;

    async fn search(&mut self, query: &SearchQuery) -> Result<Vec<Row>>;

    async fn fetch_all(&mut self, table: &Identifier) -> Result<Vec<Row>>;

    async fn update(
        &mut self,
        table: &Identifier,
        changes: &Record,
        selector: &Selector,
    ) -> Result<u64>;

    async fn delete(&mut self, table: &Identifier, selector: &Selector) -> Result<u64>;

    async fn truncate(&mut self, table: &Identifier) -> Result<()>;

    async fn drop_table(&mut self, table: &Identifier) -> Result<()>;

    async fn list_tables(&mut self, pattern: Option<&str>) -> Result<Vec<String>>;

    async fn list_databases(&mut self, pattern: Option<&str>) -> Result<Vec<String>>;

    async fn list_engines(&mut self) -> Result<Vec<EngineInfo>>;

    async fn install_engine(&mut self, soname: &Identifier) -> Result<()>;

    async fn create_analytics_table(&mut self, spec: &AnalyticsSpec) -> Result<()>;

    /// Copy source rows whose key is not yet in the analytics table.
    async fn sync_analytics(&mut self, spec: &AnalyticsSpec) -> Result<u64>;

    async fn analytics_report(
        &mut self,
        table: &Identifier,
        group_by: &Identifier,
    ) -> Result<AnalyticsReport>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens sessions from persisted connection settings.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, connection: &ConnectionConfig) -> Result<Box<dyn Session>>;
}
