//! Command results and how they are printed.

use crate::analytics::AnalyticsReport;
use crate::batch::BatchReport;
use crate::db::{EngineInfo, Row};
use crate::error::Result;

use anyhow::Context as _;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }
}

/// What a command produced. Serialized as-is for `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    Status {
        message: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    /// Names, e.g. tables or databases. `noun` is plural.
    List { noun: String, items: Vec<String> },
    Rows { noun: String, rows: Vec<Row> },
    Engines { engines: Vec<EngineInfo> },
    Batch(BatchReport),
    Analytics(AnalyticsReport),
}

impl Output {
    pub fn status(message: impl Into<String>) -> Self {
        Output::Status {
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    /// Attach a warning to a status; other variants are returned unchanged.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        if let Output::Status { warnings, .. } = &mut self {
            warnings.push(warning.into());
        }
        self
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => {
                Ok(serde_json::to_string_pretty(self).context("failed to serialize output")?)
            }
            OutputFormat::Human => self.render_human(),
        }
    }

    fn render_human(&self) -> Result<String> {
        let mut out = String::new();
        match self {
            Output::Status { message, warnings } => {
                out.push_str(message);
                for warning in warnings {
                    let _ = write!(out, "\nwarning: {warning}");
                }
            }
            Output::List { noun, items } if items.is_empty() => {
                let _ = write!(out, "No {noun} found.");
            }
            Output::List { noun, items } => {
                let _ = write!(out, "Found {} {noun}:", items.len());
                for item in items {
                    let _ = write!(out, "\n- {item}");
                }
            }
            Output::Rows { noun, rows } if rows.is_empty() => {
                let _ = write!(out, "No {noun} found.");
            }
            Output::Rows { noun, rows } => {
                let _ = write!(out, "Found {} {noun}:", rows.len());
                for row in rows {
                    let pretty =
                        serde_json::to_string_pretty(row).context("failed to format row")?;
                    let _ = write!(out, "\n{pretty}");
                }
            }
            Output::Engines { engines } => {
                out.push_str("Storage engines:");
                for engine in engines {
                    let _ = write!(out, "\n - {}: {}", engine.engine, engine.support);
                }
            }
            Output::Batch(report) => {
                let _ = write!(
                    out,
                    "Inserted {} rows into `{}` from {}.",
                    report.inserted,
                    report.table,
                    report.file.display()
                );
                if !report.skipped.is_empty() {
                    let _ = write!(out, "\nSkipped {} rows:", report.skipped.len());
                    for skipped in &report.skipped {
                        let _ = write!(out, "\n  line {}: {}", skipped.line, skipped.reason);
                    }
                }
                if !report.ignored_columns.is_empty() {
                    let _ = write!(
                        out,
                        "\nIgnored columns: {}",
                        report.ignored_columns.join(", ")
                    );
                }
            }
            Output::Analytics(report) => {
                let _ = write!(
                    out,
                    "Analytics for `{}` grouped by `{}` ({} rows",
                    report.table, report.group_by, report.total
                );
                if let Some(norm) = report.average_norm {
                    let _ = write!(out, ", average norm {norm:.6}");
                }
                out.push_str("):");
                for group in &report.groups {
                    let _ = write!(
                        out,
                        "\n- {}: {}",
                        group.group.as_deref().unwrap_or("(none)"),
                        group.total
                    );
                }
            }
        }
        Ok(out)
    }
}
