//! Inserting, searching, updating and deleting rows.

use super::tables::vector_dimension;
use crate::batch::{BatchReader, BatchReport, BatchRow};
use crate::cli::{DeleteArgs, InsertArgs, SearchArgs, SelectorArgs, UpdateArgs};
use crate::db::{SearchQuery, Session};
use crate::error::{DbError, InputError, Result};
use crate::output::Output;
use crate::prompt::Prompt;
use crate::schema::{EMBEDDING_COLUMN, FieldValue, Identifier, Record, Selector};
use crate::vector::Embedding;

use serde_json::Value;
use std::path::Path;

pub async fn insert(args: InsertArgs, session: &mut dyn Session) -> Result<Output> {
    let table = Identifier::parse("table", &args.table)?;
    match (&args.data, &args.file) {
        (Some(data), None) => insert_one(&table, data, session).await,
        (None, Some(file)) => insert_batch(&table, file, session).await,
        (None, None) => Err(InputError::Missing("pass --data or --file".into()).into()),
        (Some(_), Some(_)) => {
            Err(InputError::Invalid("--data and --file cannot be combined".into()).into())
        }
    }
}

async fn insert_one(table: &Identifier, data: &str, session: &mut dyn Session) -> Result<Output> {
    let record = Record::from_json("--data", data)?;
    let embedding = record.embedding.as_ref().ok_or_else(|| {
        InputError::Missing(format!("--data must include an \"{EMBEDDING_COLUMN}\" array"))
    })?;
    let dimension = vector_dimension(session, table).await?;
    embedding.ensure_dimension(table.as_str(), dimension)?;

    tracing::debug!(%table, columns = ?record.column_names(), "inserting row");
    let inserted = session.insert(table, &record).await?;
    Ok(Output::status(format!("Inserted {inserted} row into `{table}`.")))
}

async fn insert_batch(table: &Identifier, file: &Path, session: &mut dyn Session) -> Result<Output> {
    let dimension = vector_dimension(session, table).await?;
    let reader = BatchReader::from_path(file, table, dimension)?;
    let ignored_columns = reader.ignored_columns().to_vec();

    let mut skipped = Vec::new();
    let inserted = {
        let mut records = reader.filter_map(|row| match row {
            Ok(BatchRow::Accepted(record)) => Some(Ok(record)),
            Ok(BatchRow::Skipped(row)) => {
                skipped.push(row);
                None
            }
            Err(error) => Some(Err(error)),
        });
        session.insert_all(table, &mut records).await?
    };
    tracing::info!(%table, inserted, skipped = skipped.len(), "batch insert finished");

    Ok(Output::Batch(BatchReport {
        table: table.to_string(),
        file: file.to_path_buf(),
        inserted,
        skipped,
        ignored_columns,
    }))
}

pub async fn search(args: SearchArgs, session: &mut dyn Session) -> Result<Output> {
    let table = Identifier::parse("table", &args.table)?;
    let vector = Embedding::parse("--query-vector", &args.query_vector)?;
    if args.k == 0 {
        return Err(InputError::Invalid("--k must be at least 1".into()).into());
    }
    let dimension = vector_dimension(session, &table).await?;
    vector.ensure_dimension(table.as_str(), dimension)?;

    let rows = session
        .search(&SearchQuery {
            table,
            vector,
            metric: args.distance,
            limit: args.k,
        })
        .await?;
    Ok(Output::Rows {
        noun: "results".into(),
        rows,
    })
}

/// A key given on the command line: numbers bind as numbers, anything else as text.
fn key_value(raw: &str) -> FieldValue {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Number(_)) => FieldValue::from(&value),
        _ => FieldValue::Text(raw.to_string()),
    }
}

fn selector(args: &SelectorArgs) -> Result<Selector> {
    if let Some(clause) = &args.where_clause {
        let params = match &args.params {
            Some(json) => match serde_json::from_str::<Value>(json)
                .map_err(|error| InputError::json("--params", error))?
            {
                Value::Object(params) => params,
                _ => {
                    return Err(InputError::Invalid("--params must be a JSON object".into()).into());
                }
            },
            None => serde_json::Map::new(),
        };
        return Ok(Selector::Where {
            clause: clause.clone(),
            params,
        });
    }

    if args.ids.is_empty() {
        return Err(InputError::Missing("select rows with --id or --where".into()).into());
    }
    Ok(Selector::Keys {
        column: Identifier::parse("column", &args.key_column)?,
        values: args.ids.iter().map(|raw| key_value(raw)).collect(),
    })
}

fn affected(output: Output, affected: u64) -> Output {
    if affected == 0 {
        output.with_warning("no rows matched the selection")
    } else {
        output
    }
}

pub async fn update(args: UpdateArgs, session: &mut dyn Session) -> Result<Output> {
    let table = Identifier::parse("table", &args.table)?;
    let changes = Record::from_json("--data", &args.data)?;
    if changes.is_empty() {
        return Err(InputError::Missing("--data must set at least one column".into()).into());
    }
    let selector = selector(&args.selector)?;

    let dimension = vector_dimension(session, &table).await?;
    if let Some(embedding) = &changes.embedding {
        embedding.ensure_dimension(table.as_str(), dimension)?;
    }

    let updated = session.update(&table, &changes, &selector).await?;
    tracing::info!(%table, updated, "rows updated");
    Ok(affected(
        Output::status(format!("Updated {updated} rows in `{table}`.")),
        updated,
    ))
}

pub async fn delete(
    args: DeleteArgs,
    session: &mut dyn Session,
    prompt: &dyn Prompt,
) -> Result<Output> {
    let table = Identifier::parse("table", &args.table)?;
    if session.describe_table(&table).await?.is_none() {
        return Err(DbError::TableNotFound {
            table: table.to_string(),
        }
        .into());
    }

    if args.all {
        if !args.yes && !prompt.confirm(&format!("Delete every row in `{table}`?"))? {
            return Err(InputError::Aborted(format!("rows in `{table}` were kept")).into());
        }
        session.truncate(&table).await?;
        tracing::info!(%table, "table truncated");
        return Ok(Output::status(format!("Deleted all rows from `{table}`.")));
    }

    let selector = selector(&args.selector)?;
    let deleted = session.delete(&table, &selector).await?;
    tracing::info!(%table, deleted, "rows deleted");
    Ok(affected(
        Output::status(format!("Deleted {deleted} rows from `{table}`.")),
        deleted,
    ))
}
