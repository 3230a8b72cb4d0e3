//! Lazy CSV reader for `insert-vectors --file`.
//!
//! Every data row is parsed into a [`Record`] or reported as skipped with its
//! line number. Only I/O failures abort the read.

use crate::error::{InputError, Result};
use crate::schema::{EMBEDDING_COLUMN, FieldValue, Identifier, Record};
use crate::vector::Embedding;

use anyhow::Context as _;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A row left out of the batch and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchRow {
    Accepted(Record),
    Skipped(SkippedRow),
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub table: String,
    pub file: PathBuf,
    pub inserted: u64,
    pub skipped: Vec<SkippedRow>,
    pub ignored_columns: Vec<String>,
}

pub struct BatchReader<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    /// Per CSV field: the target column, or `None` when the header is ignored.
    columns: Vec<Option<Identifier>>,
    embedding_index: usize,
    dimension: usize,
    table: String,
    ignored: Vec<String>,
}

impl BatchReader<File> {
    pub fn from_path(path: &Path, table: &Identifier, dimension: usize) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open CSV file {}", path.display()))?;
        Self::from_reader(file, table, dimension)
    }
}

impl<R: Read> BatchReader<R> {
    pub fn from_reader(reader: R, table: &Identifier, dimension: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let headers = reader.headers()?.clone();

        let mut seen = HashSet::new();
        let mut ignored = Vec::new();
        let mut embedding_index = None;
        let mut columns = Vec::with_capacity(headers.len());

        for (index, header) in headers.iter().enumerate() {
            if header == EMBEDDING_COLUMN && embedding_index.is_none() {
                embedding_index = Some(index);
                columns.push(None);
                continue;
            }
            match Identifier::parse("column", header) {
                Ok(column) if !column.is_embedding() && seen.insert(column.clone()) => {
                    columns.push(Some(column));
                }
                _ => {
                    tracing::warn!(header, "ignoring CSV column");
                    ignored.push(header.to_string());
                    columns.push(None);
                }
            }
        }

        let embedding_index = embedding_index.ok_or_else(|| {
            InputError::Missing(format!(
                "CSV header must contain an `{EMBEDDING_COLUMN}` column"
            ))
        })?;

        Ok(Self {
            records: reader.into_records(),
            columns,
            embedding_index,
            dimension,
            table: table.to_string(),
            ignored,
        })
    }

    /// Header names that will not be inserted.
    pub fn ignored_columns(&self) -> &[String] {
        &self.ignored
    }

    fn parse(&self, record: &csv::StringRecord) -> std::result::Result<Record, InputError> {
        let raw = record.get(self.embedding_index).unwrap_or_default();
        let embedding = Embedding::parse("embedding", raw)?;
        embedding.ensure_dimension(&self.table, self.dimension)?;

        let fields = self
            .columns
            .iter()
            .zip(record.iter())
            .filter_map(|(column, value)| {
                let column = column.clone()?;
                let value = if value.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Text(value.to_string())
                };
                Some((column, value))
            })
            .collect();

        Ok(Record {
            embedding: Some(embedding),
            fields,
        })
    }
}

impl<R: Read> Iterator for BatchReader<R> {
    type Item = Result<BatchRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.records.next()? {
            Ok(record) => {
                let line = record.position().map_or(0, csv::Position::line);
                match self.parse(&record) {
                    Ok(parsed) => BatchRow::Accepted(parsed),
                    Err(error) => BatchRow::Skipped(SkippedRow {
                        line,
                        reason: error.to_string(),
                    }),
                }
            }
            Err(error) if error.is_io_error() => return Some(Err(error.into())),
            Err(error) => BatchRow::Skipped(SkippedRow {
                line: error.position().map_or(0, csv::Position::line),
                reason: error.to_string(),
            }),
        };

        if let BatchRow::Skipped(skipped) = &item {
            tracing::warn!(line = skipped.line, reason = %skipped.reason, "skipping CSV row");
        }
        Some(Ok(item))
    }
}
