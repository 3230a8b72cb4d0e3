//! diem: manage vector embeddings stored in MariaDB from the command line.

pub mod analytics;
pub mod batch;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod prompt;
pub mod schema;
pub mod vector;

pub use error::{Error, Result};
