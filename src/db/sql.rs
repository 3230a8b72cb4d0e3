//! SQL text for every statement diem issues.
//!
//! Identifiers are validated before they get here and are always
//! backtick-quoted; user values only ever travel as `?` binds.

use crate::analytics::{AnalyticsSpec, MetadataSource};
use crate::error::InputError;
use crate::schema::{
    DEFAULT_KEY_COLUMN, EMBEDDING_COLUMN, FieldValue, Identifier, Record, Selector, TableSpec,
};

use super::session::SearchQuery;

/// SQL text plus positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<FieldValue>,
}

impl Statement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }
}

pub fn create_table(spec: &TableSpec) -> String {
    let mut definitions = Vec::new();
    if spec.primary_key.is_none() {
        definitions.push(format!(
            "`{DEFAULT_KEY_COLUMN}` BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY"
        ));
    }
    for column in &spec.columns {
        definitions.push(format!("{} {}", column.name.quoted(), column.sql_type));
    }
    definitions.push(format!(
        "`{EMBEDDING_COLUMN}` VECTOR({}) NOT NULL",
        spec.dimension
    ));
    if let Some(primary_key) = &spec.primary_key {
        definitions.push(format!("PRIMARY KEY ({})", primary_key.quoted()));
    }
    definitions.push(format!(
        "VECTOR INDEX {} (`{EMBEDDING_COLUMN}`) M={} DISTANCE={}",
        spec.index_name.quoted(),
        spec.m,
        spec.metric.index_keyword()
    ));

    format!(
        "CREATE TABLE {} (\n  {}\n) ENGINE=InnoDB",
        spec.name.quoted(),
        definitions.join(",\n  ")
    )
}

pub fn insert(table: &Identifier, record: &Record) -> Statement {
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut binds = Vec::new();

    for (name, value) in &record.fields {
        columns.push(name.quoted());
        placeholders.push("?".to_string());
        binds.push(value.clone());
    }
    if let Some(embedding) = &record.embedding {
        columns.push(format!("`{EMBEDDING_COLUMN}`"));
        placeholders.push("VEC_FromText(?)".to_string());
        binds.push(FieldValue::Text(embedding.to_sql_text()));
    }

    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            columns.join(", "),
            placeholders.join(", ")
        ),
        binds,
    }
}

pub fn search(query: &SearchQuery) -> Statement {
    Statement {
        sql: format!(
            "SELECT *, {}(`{EMBEDDING_COLUMN}`, VEC_FromText(?)) AS distance FROM {} ORDER BY distance ASC LIMIT ?",
            query.metric.function(),
            query.table.quoted()
        ),
        binds: vec![
            FieldValue::Text(query.vector.to_sql_text()),
            FieldValue::Int(i64::from(query.limit)),
        ],
    }
}

pub fn select_all(table: &Identifier) -> String {
    format!("SELECT * FROM {}", table.quoted())
}

pub fn update(
    table: &Identifier,
    changes: &Record,
    selector: &Selector,
) -> std::result::Result<Statement, InputError> {
    if changes.is_empty() {
        return Err(InputError::Missing("no data provided to update".into()));
    }

    let mut assignments = Vec::new();
    let mut binds = Vec::new();
    for (name, value) in &changes.fields {
        assignments.push(format!("{} = ?", name.quoted()));
        binds.push(value.clone());
    }
    if let Some(embedding) = &changes.embedding {
        assignments.push(format!("`{EMBEDDING_COLUMN}` = VEC_FromText(?)"));
        binds.push(FieldValue::Text(embedding.to_sql_text()));
    }

    let (predicate, predicate_binds) = where_clause(selector)?;
    binds.extend(predicate_binds);

    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {}",
            table.quoted(),
            assignments.join(", "),
            predicate
        ),
        binds,
    })
}

pub fn delete(
    table: &Identifier,
    selector: &Selector,
) -> std::result::Result<Statement, InputError> {
    let (predicate, binds) = where_clause(selector)?;
    Ok(Statement {
        sql: format!("DELETE FROM {} WHERE {}", table.quoted(), predicate),
        binds,
    })
}

pub fn truncate(table: &Identifier) -> String {
    format!("TRUNCATE TABLE {}", table.quoted())
}

pub fn drop_table(table: &Identifier) -> String {
    format!("DROP TABLE {}", table.quoted())
}

pub fn describe_table(table: &Identifier) -> Statement {
    Statement {
        sql: "SELECT COLUMN_NAME, COLUMN_TYPE FROM information_schema.COLUMNS \
              WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION"
            .into(),
        binds: vec![FieldValue::Text(table.to_string())],
    }
}

pub fn list_tables(pattern: Option<&str>) -> Statement {
    let mut statement =
        Statement::new("SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE()");
    if let Some(pattern) = pattern {
        statement.sql.push_str(" AND TABLE_NAME LIKE ?");
        statement.binds.push(FieldValue::Text(pattern.to_string()));
    }
    statement.sql.push_str(" ORDER BY TABLE_NAME");
    statement
}

pub fn list_databases(pattern: Option<&str>) -> Statement {
    let mut statement = Statement::new("SELECT SCHEMA_NAME FROM information_schema.SCHEMATA");
    if let Some(pattern) = pattern {
        statement.sql.push_str(" WHERE SCHEMA_NAME LIKE ?");
        statement.binds.push(FieldValue::Text(pattern.to_string()));
    }
    statement.sql.push_str(" ORDER BY SCHEMA_NAME");
    statement
}

pub fn list_engines() -> &'static str {
    "SELECT ENGINE, SUPPORT, COMMENT FROM information_schema.ENGINES ORDER BY ENGINE"
}

pub fn install_soname(soname: &Identifier) -> String {
    format!("INSTALL SONAME '{soname}'")
}

pub fn create_analytics_table(spec: &AnalyticsSpec) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {} {},\n  `{EMBEDDING_COLUMN}` LONGTEXT,\n  `metadata` LONGTEXT,\n  `norm` DOUBLE,\n  `synced_at` DATETIME\n) ENGINE=ColumnStore",
        spec.target.quoted(),
        spec.key_column.quoted(),
        spec.key_type
    )
}

/// Copy rows missing from the analytics table. The norm is the Euclidean
/// distance to the origin, computed by the server.
pub fn sync_analytics(spec: &AnalyticsSpec) -> Statement {
    let key = spec.key_column.quoted();
    let metadata = match &spec.metadata {
        MetadataSource::Column(column) => format!("s.{}", column.quoted()),
        MetadataSource::Columns(columns) if columns.is_empty() => "NULL".to_string(),
        MetadataSource::Columns(columns) => {
            let pairs: Vec<String> = columns
                .iter()
                .map(|column| format!("'{column}', s.{}", column.quoted()))
                .collect();
            format!("JSON_OBJECT({})", pairs.join(", "))
        }
    };
    let origin = origin(spec.dimension);

    Statement {
        sql: format!(
            "INSERT INTO {target} ({key}, `{EMBEDDING_COLUMN}`, `metadata`, `norm`, `synced_at`) \
             SELECT s.{key}, VEC_ToText(s.`{EMBEDDING_COLUMN}`), {metadata}, \
             VEC_DISTANCE_EUCLIDEAN(s.`{EMBEDDING_COLUMN}`, VEC_FromText(?)), NOW() \
             FROM {source} s LEFT JOIN {target} t ON t.{key} = s.{key} \
             WHERE t.{key} IS NULL",
            target = spec.target.quoted(),
            source = spec.source.quoted(),
        ),
        binds: vec![FieldValue::Text(origin)],
    }
}

/// `VEC_FromText` literal for the zero vector of `dimension` components.
fn origin(dimension: usize) -> String {
    format!("[{}]", vec!["0"; dimension].join(","))
}

pub fn analytics_groups(table: &Identifier, group_by: &Identifier) -> String {
    format!(
        "SELECT JSON_VALUE(`metadata`, '$.{group_by}') AS group_key, COUNT(*) AS total \
         FROM {} GROUP BY group_key ORDER BY total DESC, group_key",
        table.quoted()
    )
}

pub fn analytics_summary(table: &Identifier) -> String {
    format!(
        "SELECT COUNT(*) AS total, AVG(`norm`) AS average_norm FROM {}",
        table.quoted()
    )
}

fn where_clause(
    selector: &Selector,
) -> std::result::Result<(String, Vec<FieldValue>), InputError> {
    match selector {
        Selector::Keys { column, values } => {
            if values.is_empty() {
                return Err(InputError::Missing("at least one --id is required".into()));
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            Ok((format!("{} IN ({placeholders})", column.quoted()), values.clone()))
        }
        Selector::Where { clause, params } => {
            if clause.trim().is_empty() {
                return Err(InputError::Missing("--where must not be empty".into()));
            }
            bind_named(clause, params)
        }
    }
}

/// Rewrite `:name` placeholders to `?` and collect their values in order.
///
/// Quoted text (`'...'`, `"..."`, `` `...` ``) is copied verbatim. A literal
/// `?` outside quotes is rejected since it would shift every bind.
pub fn bind_named(
    clause: &str,
    params: &serde_json::Map<String, serde_json::Value>,
) -> std::result::Result<(String, Vec<FieldValue>), InputError> {
    let mut sql = String::with_capacity(clause.len());
    let mut binds = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = clause.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            sql.push(c);
            if c == '\\' && open != '`' {
                if let Some(escaped) = chars.next() {
                    sql.push(escaped);
                }
            } else if c == open {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                sql.push(c);
            }
            '?' => {
                return Err(InputError::Invalid(
                    "use :name placeholders with --params instead of `?` in --where".into(),
                ));
            }
            ':' if chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') =>
            {
                let mut name = String::new();
                while let Some(next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' {
                        name.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = params
                    .get(&name)
                    .ok_or_else(|| InputError::UnboundParameter(name.clone()))?;
                binds.push(FieldValue::from(value));
                sql.push('?');
            }
            _ => sql.push(c),
        }
    }

    if quote.is_some() {
        return Err(InputError::Invalid("unterminated quote in --where".into()));
    }
    Ok((sql, binds))
}
