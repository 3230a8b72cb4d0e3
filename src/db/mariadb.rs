//! MariaDB session over a single sqlx connection.

use crate::analytics::{AnalyticsReport, AnalyticsSpec, GroupCount};
use crate::config::ConnectionConfig;
use crate::error::{DbError, Result};
use crate::schema::{FieldValue, Identifier, Record, Selector, TableSpec};

use super::row::decode_row;
use super::session::{Connector, EngineInfo, Row, SearchQuery, ServerVersion, Session, TableColumn};
use super::sql::{self, Statement};

use anyhow::Context as _;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection};
use sqlx::query::Query;
use sqlx::{ConnectOptions as _, Connection as _, Row as _};

/// Opens [`MariaDbSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MariaDbConnector;

#[async_trait::async_trait]
impl Connector for MariaDbConnector {
    async fn open(&self, connection: &ConnectionConfig) -> Result<Box<dyn Session>> {
        let conn = connection
            .connect_options()
            .connect()
            .await
            .map_err(DbError::Connect)?;
        tracing::debug!(target = %connection.target(), "session opened");
        Ok(Box::new(MariaDbSession { conn }))
    }
}

pub struct MariaDbSession {
    conn: MySqlConnection,
}

fn prepare(statement: &Statement) -> Query<'_, MySql, MySqlArguments> {
    tracing::debug!(sql = %statement.sql, binds = statement.binds.len(), "prepared statement");
    let mut query = sqlx::query(&statement.sql);
    for value in &statement.binds {
        query = match value {
            FieldValue::Null => query.bind(None::<String>),
            FieldValue::Bool(flag) => query.bind(*flag),
            FieldValue::Int(int) => query.bind(*int),
            FieldValue::Float(float) => query.bind(*float),
            FieldValue::Text(text) => query.bind(text.as_str()),
        };
    }
    query
}

impl MariaDbSession {
    /// Run a statement that takes no binds over the text protocol. DDL and
    /// plugin statements are not all preparable.
    async fn execute_raw(&mut self, sql: &str) -> Result<u64> {
        tracing::debug!(%sql, "raw statement");
        let result = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let result = prepare(statement).execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_rows(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let rows = prepare(statement).fetch_all(&mut self.conn).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_names(&mut self, statement: &Statement) -> Result<Vec<String>> {
        let rows = prepare(statement).fetch_all(&mut self.conn).await?;
        rows.iter()
            .map(|row| row.try_get_unchecked::<String, _>(0).map_err(Into::into))
            .collect()
    }
}

#[async_trait::async_trait]
impl Session for MariaDbSession {
    async fn server_version(&mut self) -> Result<ServerVersion> {
        let raw: String = sqlx::query_scalar("SELECT VERSION()")
            .fetch_one(&mut self.conn)
            .await
            .context("failed to read server version")?;
        Ok(ServerVersion::parse(&raw))
    }

    async fn describe_table(&mut self, table: &Identifier) -> Result<Option<Vec<TableColumn>>> {
        let statement = sql::describe_table(table);
        let rows = prepare(&statement)
            .fetch_all(&mut self.conn)
            .await
            .with_context(|| format!("failed to describe table {table}"))?;

        let columns = rows
            .iter()
            .map(|row| {
                Ok(TableColumn::new(
                    row.try_get_unchecked::<String, _>(0)?,
                    row.try_get_unchecked::<String, _>(1)?,
                ))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        Ok((!columns.is_empty()).then_some(columns))
    }

    async fn create_table(&mut self, spec: &TableSpec) -> Result<()> {
        self.execute_raw(&sql::create_table(spec)).await?;
        Ok(())
    }

    async fn insert(&mut self, table: &Identifier, record: &Record) -> Result<u64> {
        self.execute(&sql::insert(table, record)).await
    }

    async fn insert_all(
        &mut self,
        table: &Identifier,
        records: &mut (dyn Iterator<Item = Result<Record>> + Send),
    ) -> Result<u64> {
        let mut tx = self
            .conn
            .begin()
            .await
            .context("failed to open batch insert transaction")?;

        let mut inserted = 0;
        for record in records {
            let result: Result<u64> = match record {
                Ok(record) => {
                    let statement = sql::insert(table, &record);
                    prepare(&statement)
                        .execute(&mut *tx)
                        .await
                        .map(|done| done.rows_affected())
                        .map_err(Into::into)
                }
                Err(error) => Err(error),
            };
            match result {
                Ok(rows) => inserted += rows,
                Err(error) => {
                    if let Err(rollback_error) = tx.rollback().await {
                        tracing::warn!(%rollback_error, "batch rollback failed");
                    }
                    return Err(error);
                }
            }
        }

        tx.commit()
            .await
            .context("failed to commit batch insert")?;
        Ok(inserted)
    }

    async fn search(&mut self, query: &SearchQuery) -> Result<Vec<Row>> {
        self.fetch_rows(&sql::search(query)).await
    }

    async fn fetch_all(&mut self, table: &Identifier) -> Result<Vec<Row>> {
        self.fetch_rows(&Statement {
            sql: sql::select_all(table),
            binds: Vec::new(),
        })
        .await
    }

    async fn update(
        &mut self,
        table: &Identifier,
        changes: &Record,
        selector: &Selector,
    ) -> Result<u64> {
        let statement = sql::update(table, changes, selector)?;
        self.execute(&statement).await
    }

    async fn delete(&mut self, table: &Identifier, selector: &Selector) -> Result<u64> {
        let statement = sql::delete(table, selector)?;
        self.execute(&statement).await
    }

    async fn truncate(&mut self, table: &Identifier) -> Result<()> {
        self.execute_raw(&sql::truncate(table)).await?;
        Ok(())
    }

    async fn drop_table(&mut self, table: &Identifier) -> Result<()> {
        self.execute_raw(&sql::drop_table(table)).await?;
        Ok(())
    }

    async fn list_tables(&mut self, pattern: Option<&str>) -> Result<Vec<String>> {
        self.fetch_names(&sql::list_tables(pattern)).await
    }

    async fn list_databases(&mut self, pattern: Option<&str>) -> Result<Vec<String>> {
        self.fetch_names(&sql::list_databases(pattern)).await
    }

    async fn list_engines(&mut self) -> Result<Vec<EngineInfo>> {
        let rows = sqlx::query(sql::list_engines())
            .fetch_all(&mut self.conn)
            .await
            .context("failed to list storage engines")?;

        let engines = rows
            .iter()
            .map(|row| {
                Ok(EngineInfo {
                    engine: row.try_get_unchecked(0)?,
                    support: row.try_get_unchecked(1)?,
                    comment: row.try_get_unchecked(2)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
        Ok(engines)
    }

    async fn install_engine(&mut self, soname: &Identifier) -> Result<()> {
        self.execute_raw(&sql::install_soname(soname)).await?;
        Ok(())
    }

    async fn create_analytics_table(&mut self, spec: &AnalyticsSpec) -> Result<()> {
        self.execute_raw(&sql::create_analytics_table(spec)).await?;
        Ok(())
    }

    async fn sync_analytics(&mut self, spec: &AnalyticsSpec) -> Result<u64> {
        self.execute(&sql::sync_analytics(spec)).await
    }

    async fn analytics_report(
        &mut self,
        table: &Identifier,
        group_by: &Identifier,
    ) -> Result<AnalyticsReport> {
        let group_rows = sqlx::query(&sql::analytics_groups(table, group_by))
            .fetch_all(&mut self.conn)
            .await
            .with_context(|| format!("failed to group {table} by {group_by}"))?;

        let groups = group_rows
            .iter()
            .map(|row| {
                Ok(GroupCount {
                    group: row.try_get_unchecked(0)?,
                    total: row.try_get_unchecked(1)?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        let summary = sqlx::query(&sql::analytics_summary(table))
            .fetch_one(&mut self.conn)
            .await
            .with_context(|| format!("failed to summarize {table}"))?;

        Ok(AnalyticsReport {
            table: table.to_string(),
            group_by: group_by.to_string(),
            groups,
            total: summary.try_get_unchecked(0)?,
            average_norm: summary.try_get_unchecked(1)?,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let MariaDbSession { conn } = *self;
        conn.close()
            .await
            .context("failed to close database connection")?;
        Ok(())
    }
}
