//! Database abstraction layer for sqldocx.
//!
//! Provides a trait-based interface for statement execution so the batch
//! pipeline can run against SQL Server or an in-memory mock.

mod mock;
mod mssql;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient, MockResponse};
pub use mssql::MssqlClient;
pub use types::{ColumnInfo, QueryResult, ResultSet, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Creates a SQL Server client for the given configuration.
///
/// `retries` is the number of extra attempts made after a transient failure.
pub async fn connect(config: &ConnectionConfig, retries: u32) -> Result<Box<dyn DatabaseClient>> {
    let client = MssqlClient::connect(config, retries).await?;
    Ok(Box::new(client))
}

/// Trait defining the interface for database clients.
///
/// `execute_query` returns `SqlDocxError::Query` for ordinary statement
/// failures; any other error means the connection itself is unusable.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a single SQL statement and returns its first result set.
    async fn execute_query(&self, sql: &str) -> Result<ResultSet>;

    /// Returns true while the connection can still accept statements.
    fn is_live(&self) -> bool;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
