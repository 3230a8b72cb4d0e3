//! Top-level error types for diem.

use std::path::PathBuf;
use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Connection configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("not connected: no connection config at {}; run `diem connect` first", path.display())]
    NotConnected { path: PathBuf },

    #[error("failed to load config from {}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: Arc<config::ConfigError>,
    },

    #[error("failed to write config to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid connection URL: {0}")]
    InvalidUrl(String),
}

/// Session and query errors that are not raw driver failures.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to connect to MariaDB: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("table `{table}` does not exist")]
    TableNotFound { table: String },

    #[error("table `{table}` has no VECTOR column named `embedding`")]
    NoVectorColumn { table: String },
}

/// Command misuse and malformed user input.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid {kind} name: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("invalid column type for `{column}`: {value:?}")]
    InvalidColumnType { column: String, value: String },

    #[error("invalid JSON in {argument}: {source}")]
    InvalidJson {
        argument: &'static str,
        source: Arc<serde_json::Error>,
    },

    #[error("{0}")]
    Missing(String),

    #[error("{0}")]
    Invalid(String),

    #[error("vector dimension mismatch for `{table}`: expected {expected}, got {actual}")]
    DimensionMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("embedding must be a non-empty array of finite numbers")]
    InvalidEmbedding,

    #[error("parameter `:{0}` used in --where but not provided in --params")]
    UnboundParameter(String),

    #[error("aborted: {0}")]
    Aborted(String),
}

impl InputError {
    pub(crate) fn json(argument: &'static str, source: serde_json::Error) -> Self {
        InputError::InvalidJson {
            argument,
            source: Arc::new(source),
        }
    }
}
