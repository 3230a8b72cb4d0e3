//! Table lifecycle and listings.

use crate::cli::{CreateIndexArgs, DeleteTableArgs, PatternArgs, TableArgs};
use crate::db::{Session, embedding_dimension};
use crate::error::{DbError, InputError, Result};
use crate::output::Output;
use crate::prompt::Prompt;
use crate::schema::{ColumnDef, Identifier, TableSpec};

/// Dimension of `table`'s `embedding` column, read from the server.
pub(super) async fn vector_dimension(session: &mut dyn Session, table: &Identifier) -> Result<usize> {
    let columns = session
        .describe_table(table)
        .await?
        .ok_or_else(|| DbError::TableNotFound {
            table: table.to_string(),
        })?;
    let dimension = embedding_dimension(&columns).ok_or_else(|| DbError::NoVectorColumn {
        table: table.to_string(),
    })?;
    Ok(dimension)
}

pub async fn create_index(args: CreateIndexArgs, session: &mut dyn Session) -> Result<Output> {
    let columns = match &args.columns {
        Some(json) => ColumnDef::parse_schema(json)?,
        None => Vec::new(),
    };
    let spec = TableSpec {
        name: Identifier::parse("table", &args.table)?,
        dimension: args.dim,
        columns,
        primary_key: args
            .primary_key
            .as_deref()
            .map(|key| Identifier::parse("column", key))
            .transpose()?,
        metric: args.distance,
        m: args.m,
        index_name: Identifier::parse("index", &args.index_name)?,
    };
    spec.validate()?;

    if session.describe_table(&spec.name).await?.is_some() {
        tracing::info!(table = %spec.name, "table already exists");
        return Ok(Output::status(format!(
            "Table `{}` already exists; nothing to do.",
            spec.name
        )));
    }

    session.create_table(&spec).await?;
    tracing::info!(table = %spec.name, dimension = spec.dimension, "vector table created");
    Ok(Output::status(format!(
        "Created table `{}` with VECTOR({}) and {} index `{}` (M={}).",
        spec.name, spec.dimension, spec.metric, spec.index_name, spec.m
    )))
}

pub async fn list_tables(args: PatternArgs, session: &mut dyn Session) -> Result<Output> {
    let items = session.list_tables(args.pattern.as_deref()).await?;
    Ok(Output::List {
        noun: "tables".into(),
        items,
    })
}

pub async fn list_databases(args: PatternArgs, session: &mut dyn Session) -> Result<Output> {
    let items = session.list_databases(args.pattern.as_deref()).await?;
    Ok(Output::List {
        noun: "databases".into(),
        items,
    })
}

pub async fn get_all(args: TableArgs, session: &mut dyn Session) -> Result<Output> {
    let table = Identifier::parse("table", &args.table)?;
    if session.describe_table(&table).await?.is_none() {
        return Err(DbError::TableNotFound {
            table: table.to_string(),
        }
        .into());
    }
    let rows = session.fetch_all(&table).await?;
    Ok(Output::Rows {
        noun: "rows".into(),
        rows,
    })
}

pub async fn delete_table(
    args: DeleteTableArgs,
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

    if !args.yes && !prompt.confirm(&format!("Drop table `{table}` and all its rows?"))? {
        return Err(InputError::Aborted(format!("table `{table}` was not dropped")).into());
    }

    session.drop_table(&table).await?;
    tracing::info!(%table, "table dropped");
    Ok(Output::status(format!("Dropped table `{table}`.")))
}
