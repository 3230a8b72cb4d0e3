//! `init-analytics` and `run-analytics`.

use crate::analytics::{AnalyticsSpec, MetadataSource};
use crate::cli::{InitAnalyticsArgs, RunAnalyticsArgs};
use crate::db::{Session, embedding_dimension};
use crate::error::{DbError, InputError, Result};
use crate::output::Output;
use crate::schema::{EMBEDDING_COLUMN, Identifier};

use anyhow::Context as _;
use std::time::Duration;

const METADATA_COLUMN: &str = "metadata";

async fn analytics_spec(args: &InitAnalyticsArgs, session: &mut dyn Session) -> Result<AnalyticsSpec> {
    let source = Identifier::parse("table", &args.source)?;
    let target = match &args.target {
        Some(target) => Identifier::parse("table", target)?,
        None => AnalyticsSpec::default_target(&source)?,
    };
    let key_column = Identifier::parse("column", &args.key_column)?;

    let columns = session
        .describe_table(&source)
        .await?
        .ok_or_else(|| DbError::TableNotFound {
            table: source.to_string(),
        })?;
    let dimension = embedding_dimension(&columns).ok_or_else(|| DbError::NoVectorColumn {
        table: source.to_string(),
    })?;
    let key_type = columns
        .iter()
        .find(|column| column.name == key_column.as_str())
        .map(|column| column.column_type.clone())
        .ok_or_else(|| {
            InputError::Invalid(format!(
                "`{source}` has no column `{key_column}`; pass --key-column"
            ))
        })?;

    let metadata = if columns.iter().any(|column| column.name == METADATA_COLUMN) {
        MetadataSource::Column(Identifier::parse("column", METADATA_COLUMN)?)
    } else {
        let others = columns
            .iter()
            .filter(|column| column.name != key_column.as_str() && column.name != EMBEDDING_COLUMN)
            .map(|column| Identifier::parse("column", &column.name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        MetadataSource::Columns(others)
    };

    Ok(AnalyticsSpec {
        source,
        target,
        key_column,
        key_type,
        dimension,
        metadata,
    })
}

pub async fn init(args: InitAnalyticsArgs, session: &mut dyn Session) -> Result<Output> {
    let spec = analytics_spec(&args, session).await?;
    session.create_analytics_table(&spec).await?;
    let mut copied = session.sync_analytics(&spec).await?;
    tracing::info!(source = %spec.source, target = %spec.target, copied, "analytics synced");

    if args.watch {
        let period = Duration::from_secs(args.interval.max(1));
        copied += watch(session, &spec, period, tokio::signal::ctrl_c()).await?;
    }

    Ok(Output::status(format!(
        "Analytics table `{}` is ready; copied {copied} rows from `{}`.",
        spec.target, spec.source
    )))
}

/// Re-sync every `period` until `stop` resolves. Returns the rows copied.
async fn watch<F>(session: &mut dyn Session, spec: &AnalyticsSpec, period: Duration, stop: F) -> Result<u64>
where
    F: Future<Output = std::io::Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately and the initial sync already ran.
    ticker.tick().await;
    tokio::pin!(stop);

    let mut copied = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let batch = session.sync_analytics(spec).await?;
                if batch > 0 {
                    tracing::info!(target = %spec.target, copied = batch, "analytics synced");
                }
                copied += batch;
            }
            signal = &mut stop => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("stopping analytics watch");
                return Ok(copied);
            }
        }
    }
}

pub async fn run(args: RunAnalyticsArgs, session: &mut dyn Session) -> Result<Output> {
    let table = Identifier::parse("table", &args.table)?;
    let group_by = Identifier::parse("metadata key", &args.group_by)?;
    if session.describe_table(&table).await?.is_none() {
        return Err(DbError::TableNotFound {
            table: table.to_string(),
        }
        .into());
    }
    let report = session.analytics_report(&table, &group_by).await?;
    Ok(Output::Analytics(report))
}
