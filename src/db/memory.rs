//! In-memory [`Session`] used to exercise command handlers without a server.
//!
//! It understands the statement shapes diem issues, not SQL in general. A
//! `--where` clause may only be `col = :param` terms joined by `AND`.

use crate::analytics::{AnalyticsReport, AnalyticsSpec, GroupCount, MetadataSource};
use crate::config::ConnectionConfig;
use crate::error::{DbError, Result};
use crate::schema::{DEFAULT_KEY_COLUMN, EMBEDDING_COLUMN, FieldValue, Identifier, Record, Selector, TableSpec};
use crate::vector::DistanceMetric;

use super::row::embedding_json;
use super::session::{Connector, EngineInfo, Row, SearchQuery, ServerVersion, Session, TableColumn};
use super::sql;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Row>,
    auto_increment: bool,
    next_id: u64,
}

#[derive(Debug)]
pub struct MemoryState {
    pub version: String,
    pub databases: Vec<String>,
    pub tables: BTreeMap<String, MemoryTable>,
    pub engines: Vec<EngineInfo>,
    /// Refuse connections, as an unreachable server would.
    pub refuse_connections: bool,
    /// Fail the Nth (0-based) insert of the next batch.
    pub fail_batch_at: Option<usize>,
    pub opened: usize,
    pub closed: usize,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            version: "11.8.2-MariaDB".into(),
            databases: vec!["information_schema".into(), "vectors".into()],
            tables: BTreeMap::new(),
            engines: vec![
                engine("InnoDB", "DEFAULT"),
                engine("Aria", "YES"),
                engine("MEMORY", "YES"),
            ],
            refuse_connections: false,
            fail_batch_at: None,
            opened: 0,
            closed: 0,
        }
    }
}

fn engine(name: &str, support: &str) -> EngineInfo {
    EngineInfo {
        engine: name.into(),
        support: support.into(),
        comment: None,
    }
}

/// Hands out sessions that all share one [`MemoryState`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory state poisoned")
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _connection: &ConnectionConfig) -> Result<Box<dyn Session>> {
        let mut state = self.state();
        if state.refuse_connections {
            return Err(DbError::Connect(sqlx::Error::PoolTimedOut).into());
        }
        state.opened += 1;
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySession {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory state poisoned")
    }
}

fn engine_error(message: impl Into<String>) -> crate::error::Error {
    sqlx::Error::Protocol(message.into()).into()
}

fn missing_table(table: &Identifier) -> crate::error::Error {
    engine_error(format!("Table 'vectors.{table}' doesn't exist"))
}

fn field_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(flag) => Value::Bool(*flag),
        FieldValue::Int(int) => Value::from(*int),
        FieldValue::Float(float) => Value::from(*float),
        FieldValue::Text(text) => Value::String(text.clone()),
    }
}

fn stored_vector(row: &Row) -> Vec<f32> {
    row.get(EMBEDDING_COLUMN)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_f64)
                .map(|value| value as f32)
                .collect()
        })
        .unwrap_or_default()
}

fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let squared = |v: &[f32]| v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>();
    match metric {
        DistanceMetric::Cosine => {
            let denominator = (squared(a) * squared(b)).sqrt();
            if denominator == 0.0 {
                1.0
            } else {
                (1.0 - dot / denominator).max(0.0)
            }
        }
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
            .sum::<f64>()
            .sqrt(),
    }
}

/// `LIKE` with `%` and `_` wildcards.
fn like(pattern: &str, text: &str) -> bool {
    fn matches(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => (0..=text.len()).any(|skip| matches(rest, &text[skip..])),
            Some(('_', rest)) => !text.is_empty() && matches(rest, &text[1..]),
            Some((c, rest)) => text.first() == Some(c) && matches(rest, &text[1..]),
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    matches(&pattern, &text)
}

/// Split a `col = :param AND ...` clause into column filters.
fn where_terms(
    clause: &str,
    params: &serde_json::Map<String, Value>,
) -> Result<Vec<(String, Value)>> {
    let (rewritten, binds) = sql::bind_named(clause, params)?;
    let mut binds = binds.iter();
    rewritten
        .split(" AND ")
        .map(|term| -> Result<(String, Value)> {
            let unsupported = || engine_error(format!("unsupported term `{term}`"));
            let (column, placeholder) = term.split_once('=').ok_or_else(unsupported)?;
            if placeholder.trim() != "?" {
                return Err(unsupported());
            }
            let value = binds.next().ok_or_else(unsupported)?;
            Ok((column.trim().trim_matches('`').to_string(), field_json(value)))
        })
        .collect()
}

/// Each entry is one alternative set of filters a row may match.
fn selected_keys(selector: &Selector) -> Result<Vec<Vec<(String, Value)>>> {
    match selector {
        Selector::Keys { column, values } => Ok(values
            .iter()
            .map(|value| vec![(column.to_string(), field_json(value))])
            .collect()),
        Selector::Where { clause, params } => Ok(vec![where_terms(clause, params)?]),
    }
}

fn row_matches(row: &Row, terms: &[(String, Value)]) -> bool {
    terms
        .iter()
        .all(|(column, value)| row.get(column).is_some_and(|stored| stored == value))
}

impl MemoryTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    fn insert(&mut self, table: &Identifier, record: &Record) -> Result<()> {
        let mut row = Row::new();
        for column in &self.columns {
            row.insert(column.name.clone(), Value::Null);
        }
        for (name, value) in &record.fields {
            if !self.has_column(name.as_str()) {
                return Err(engine_error(format!(
                    "Unknown column '{name}' in 'field list' of {table}"
                )));
            }
            row.insert(name.to_string(), field_json(value));
        }
        match &record.embedding {
            Some(embedding) => {
                row.insert(EMBEDDING_COLUMN.into(), embedding_json(embedding));
            }
            None => return Err(engine_error("Field 'embedding' doesn't have a default value")),
        }
        if self.auto_increment {
            self.next_id += 1;
            row.insert(DEFAULT_KEY_COLUMN.into(), Value::from(self.next_id));
        }
        self.rows.push(row);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Session for MemorySession {
    async fn server_version(&mut self) -> Result<ServerVersion> {
        Ok(ServerVersion::parse(&self.state().version))
    }

    async fn describe_table(&mut self, table: &Identifier) -> Result<Option<Vec<TableColumn>>> {
        Ok(self
            .state()
            .tables
            .get(table.as_str())
            .map(|stored| stored.columns.clone()))
    }

    async fn create_table(&mut self, spec: &TableSpec) -> Result<()> {
        let mut state = self.state();
        if state.tables.contains_key(spec.name.as_str()) {
            return Err(engine_error(format!("Table '{}' already exists", spec.name)));
        }

        let mut columns = Vec::new();
        if spec.primary_key.is_none() {
            columns.push(TableColumn::new(DEFAULT_KEY_COLUMN, "bigint(20) unsigned"));
        }
        for column in &spec.columns {
            columns.push(TableColumn::new(
                column.name.as_str(),
                column.sql_type.to_ascii_lowercase(),
            ));
        }
        columns.push(TableColumn::new(
            EMBEDDING_COLUMN,
            format!("vector({})", spec.dimension),
        ));

        state.tables.insert(
            spec.name.to_string(),
            MemoryTable {
                columns,
                auto_increment: spec.primary_key.is_none(),
                ..MemoryTable::default()
            },
        );
        Ok(())
    }

    async fn insert(&mut self, table: &Identifier, record: &Record) -> Result<u64> {
        let mut state = self.state();
        let stored = state
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| missing_table(table))?;
        stored.insert(table, record)?;
        Ok(1)
    }

    async fn insert_all(
        &mut self,
        table: &Identifier,
        records: &mut (dyn Iterator<Item = Result<Record>> + Send),
    ) -> Result<u64> {
        let mut state = self.state();
        let fail_at = state.fail_batch_at.take();
        let stored = state
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| missing_table(table))?;

        // Work on a copy so a failure leaves the table untouched.
        let mut pending = stored.clone();
        let mut inserted = 0;
        for (index, record) in records.enumerate() {
            if fail_at == Some(index) {
                return Err(engine_error("Duplicate entry for key 'PRIMARY'"));
            }
            pending.insert(table, &record?)?;
            inserted += 1;
        }
        *stored = pending;
        Ok(inserted)
    }

    async fn search(&mut self, query: &SearchQuery) -> Result<Vec<Row>> {
        let state = self.state();
        let stored = state
            .tables
            .get(query.table.as_str())
            .ok_or_else(|| missing_table(&query.table))?;

        let mut ranked: Vec<(f64, Row)> = stored
            .rows
            .iter()
            .map(|row| {
                let distance = distance(query.metric, &stored_vector(row), query.vector.values());
                let mut ranked = row.clone();
                ranked.insert("distance".into(), Value::from(distance));
                (distance, ranked)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(ranked
            .into_iter()
            .take(query.limit as usize)
            .map(|(_, row)| row)
            .collect())
    }

    async fn fetch_all(&mut self, table: &Identifier) -> Result<Vec<Row>> {
        let state = self.state();
        let stored = state
            .tables
            .get(table.as_str())
            .ok_or_else(|| missing_table(table))?;
        Ok(stored.rows.clone())
    }

    async fn update(
        &mut self,
        table: &Identifier,
        changes: &Record,
        selector: &Selector,
    ) -> Result<u64> {
        let filters = selected_keys(selector)?;
        let mut state = self.state();
        let stored = state
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| missing_table(table))?;

        let mut affected = 0;
        for row in &mut stored.rows {
            if !filters.iter().any(|terms| row_matches(row, terms)) {
                continue;
            }
            for (name, value) in &changes.fields {
                row.insert(name.to_string(), field_json(value));
            }
            if let Some(embedding) = &changes.embedding {
                row.insert(EMBEDDING_COLUMN.into(), embedding_json(embedding));
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&mut self, table: &Identifier, selector: &Selector) -> Result<u64> {
        let filters = selected_keys(selector)?;
        let mut state = self.state();
        let stored = state
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| missing_table(table))?;

        let before = stored.rows.len();
        stored
            .rows
            .retain(|row| !filters.iter().any(|terms| row_matches(row, terms)));
        Ok((before - stored.rows.len()) as u64)
    }

    async fn truncate(&mut self, table: &Identifier) -> Result<()> {
        let mut state = self.state();
        let stored = state
            .tables
            .get_mut(table.as_str())
            .ok_or_else(|| missing_table(table))?;
        stored.rows.clear();
        stored.next_id = 0;
        Ok(())
    }

    async fn drop_table(&mut self, table: &Identifier) -> Result<()> {
        self.state()
            .tables
            .remove(table.as_str())
            .map(|_| ())
            .ok_or_else(|| missing_table(table))
    }

    async fn list_tables(&mut self, pattern: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .state()
            .tables
            .keys()
            .filter(|name| pattern.is_none_or(|pattern| like(pattern, name)))
            .cloned()
            .collect())
    }

    async fn list_databases(&mut self, pattern: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .state()
            .databases
            .iter()
            .filter(|name| pattern.is_none_or(|pattern| like(pattern, name)))
            .cloned()
            .collect())
    }

    async fn list_engines(&mut self) -> Result<Vec<EngineInfo>> {
        Ok(self.state().engines.clone())
    }

    async fn install_engine(&mut self, soname: &Identifier) -> Result<()> {
        let name = match soname.as_str() {
            "ha_spider" => "SPIDER",
            "ha_columnstore" => "Columnstore",
            _ => return Err(engine_error(format!("Can't open shared library '{soname}.so'"))),
        };
        let mut state = self.state();
        if state.engines.iter().any(|engine| engine.engine == name) {
            return Err(engine_error(format!("Plugin '{name}' already installed")));
        }
        state.engines.push(engine(name, "YES"));
        Ok(())
    }

    async fn create_analytics_table(&mut self, spec: &AnalyticsSpec) -> Result<()> {
        let mut state = self.state();
        state
            .tables
            .entry(spec.target.to_string())
            .or_insert_with(|| MemoryTable {
                columns: vec![
                    TableColumn::new(spec.key_column.as_str(), spec.key_type.clone()),
                    TableColumn::new(EMBEDDING_COLUMN, "longtext"),
                    TableColumn::new("metadata", "longtext"),
                    TableColumn::new("norm", "double"),
                    TableColumn::new("synced_at", "datetime"),
                ],
                ..MemoryTable::default()
            });
        Ok(())
    }

    async fn sync_analytics(&mut self, spec: &AnalyticsSpec) -> Result<u64> {
        let mut state = self.state();
        let source = state
            .tables
            .get(spec.source.as_str())
            .ok_or_else(|| missing_table(&spec.source))?
            .rows
            .clone();
        let target = state
            .tables
            .get_mut(spec.target.as_str())
            .ok_or_else(|| missing_table(&spec.target))?;

        let key = spec.key_column.as_str();
        let mut copied = 0;
        for row in &source {
            let key_value = row.get(key).cloned().unwrap_or(Value::Null);
            if target.rows.iter().any(|existing| existing.get(key) == Some(&key_value)) {
                continue;
            }

            let vector = stored_vector(row);
            let metadata = match &spec.metadata {
                MetadataSource::Column(column) => row.get(column.as_str()).cloned().unwrap_or(Value::Null),
                MetadataSource::Columns(columns) if columns.is_empty() => Value::Null,
                MetadataSource::Columns(columns) => {
                    let object: serde_json::Map<String, Value> = columns
                        .iter()
                        .map(|column| {
                            let value = row.get(column.as_str()).cloned().unwrap_or(Value::Null);
                            (column.to_string(), value)
                        })
                        .collect();
                    Value::String(Value::Object(object).to_string())
                }
            };
            let norm = vector.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

            let mut copy = Row::new();
            copy.insert(key.into(), key_value);
            copy.insert(
                EMBEDDING_COLUMN.into(),
                Value::String(Value::from(vector.iter().map(|x| f64::from(*x)).collect::<Vec<_>>()).to_string()),
            );
            copy.insert("metadata".into(), metadata);
            copy.insert("norm".into(), Value::from(norm));
            copy.insert("synced_at".into(), Value::String("2026-01-01T00:00:00".into()));
            target.rows.push(copy);
            copied += 1;
        }
        Ok(copied)
    }

    async fn analytics_report(
        &mut self,
        table: &Identifier,
        group_by: &Identifier,
    ) -> Result<AnalyticsReport> {
        let state = self.state();
        let stored = state
            .tables
            .get(table.as_str())
            .ok_or_else(|| missing_table(table))?;

        let mut counts: BTreeMap<Option<String>, i64> = BTreeMap::new();
        let mut norms = Vec::new();
        for row in &stored.rows {
            let metadata = row
                .get("metadata")
                .and_then(Value::as_str)
                .and_then(|text| serde_json::from_str::<Value>(text).ok());
            let group = metadata
                .as_ref()
                .and_then(|metadata| metadata.get(group_by.as_str()))
                .filter(|value| !value.is_null())
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                });
            *counts.entry(group).or_default() += 1;
            if let Some(norm) = row.get("norm").and_then(Value::as_f64) {
                norms.push(norm);
            }
        }

        let mut groups: Vec<GroupCount> = counts
            .into_iter()
            .map(|(group, total)| GroupCount { group, total })
            .collect();
        groups.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.group.cmp(&b.group)));

        Ok(AnalyticsReport {
            table: table.to_string(),
            group_by: group_by.to_string(),
            groups,
            total: stored.rows.len() as i64,
            average_norm: (!norms.is_empty())
                .then(|| norms.iter().sum::<f64>() / norms.len() as f64),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state().closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Embedding;

    #[test]
    fn like_supports_both_wildcards() {
        assert!(like("doc%", "documents"));
        assert!(like("d_c", "doc"));
        assert!(!like("doc", "docs"));
        assert!(like("%", ""));
    }

    #[test]
    fn where_clause_terms_become_column_filters() {
        let params = serde_json::json!({"user": "u1", "n": 2});
        assert_eq!(
            where_terms("`user` = :user AND n = :n", params.as_object().unwrap()).unwrap(),
            vec![
                ("user".to_string(), Value::from("u1")),
                ("n".to_string(), Value::from(2)),
            ]
        );
    }

    #[test]
    fn cosine_distance_of_identical_vectors_is_zero() {
        assert_eq!(distance(DistanceMetric::Cosine, &[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert_eq!(distance(DistanceMetric::Euclidean, &[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }

    #[tokio::test]
    async fn failed_stream_item_rolls_back_earlier_rows() {
        let connector = MemoryConnector::new();
        let connection = ConnectionConfig::from_url("mariadb://app@localhost/vectors").unwrap();
        let mut session = connector.open(&connection).await.unwrap();
        let table = Identifier::parse("table", "docs").unwrap();
        session
            .create_table(&TableSpec {
                name: table.clone(),
                dimension: 2,
                columns: Vec::new(),
                primary_key: None,
                metric: DistanceMetric::Cosine,
                m: 8,
                index_name: Identifier::parse("index", "vec_idx").unwrap(),
            })
            .await
            .unwrap();

        let row = || Record {
            embedding: Some(Embedding::new(vec![1.0, 0.0]).unwrap()),
            fields: Vec::new(),
        };
        let items: Vec<Result<Record>> = vec![
            Ok(row()),
            Err(std::io::Error::other("disk went away").into()),
            Ok(row()),
        ];
        let mut records = items.into_iter();
        assert!(session.insert_all(&table, &mut records).await.is_err());
        assert!(connector.state().tables["docs"].rows.is_empty());

        let items: Vec<Result<Record>> = vec![Ok(row()), Ok(row())];
        let mut records = items.into_iter();
        assert_eq!(session.insert_all(&table, &mut records).await.unwrap(), 2);
        assert_eq!(connector.state().tables["docs"].rows.len(), 2);
    }
}
