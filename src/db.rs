//! Database sessions against MariaDB.

pub mod mariadb;
#[cfg(test)]
pub mod memory;
pub mod row;
pub mod session;
pub mod sql;

pub use mariadb::MariaDbConnector;
pub use session::{
    Connector, EngineInfo, Row, SearchQuery, ServerVersion, Session, TableColumn,
    embedding_dimension,
};
