//! Mock database clients for testing.
//!
//! Provides scripted in-memory clients for headless runs and tests.

use super::{ColumnInfo, DatabaseClient, ResultSet, Value};
use crate::error::{Result, SqlDocxError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted reply for one statement.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return these rows.
    Rows(ResultSet),
    /// Fail the statement with a server error message.
    QueryError(String),
    /// Drop the connection.
    ConnectionError(String),
}

/// A mock database client that returns predefined results.
///
/// Statements without a scripted response get a canned reply: `SELECT`
/// returns a single row echoing the statement, anything else affects no rows.
pub struct MockDatabaseClient {
    responses: HashMap<String, MockResponse>,
    executed: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with no scripted responses.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            executed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Scripts the response for an exact statement text.
    pub fn on(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(sql.into(), response);
        self
    }

    /// Returns the statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn default_response(sql: &str) -> ResultSet {
        let result = if sql.trim_start().to_uppercase().starts_with("SELECT") {
            ResultSet::with_data(
                vec![ColumnInfo::new("result", "nvarchar")],
                vec![vec![Value::String(format!("Mock result for: {sql}"))]],
            )
        } else {
            ResultSet::affected(0)
        };
        result.with_execution_time(Duration::from_millis(1))
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlDocxError::connection("Connection is closed"));
        }

        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        match self.responses.get(sql) {
            Some(MockResponse::Rows(result)) => Ok(result.clone()),
            Some(MockResponse::QueryError(message)) => Err(SqlDocxError::query(message.clone())),
            Some(MockResponse::ConnectionError(message)) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(SqlDocxError::connection(message.clone()))
            }
            None => Ok(Self::default_response(sql)),
        }
    }

    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A database client whose every call fails with a connection error.
#[derive(Debug, Default)]
pub struct FailingDatabaseClient;

impl FailingDatabaseClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn execute_query(&self, _sql: &str) -> Result<ResultSet> {
        Err(SqlDocxError::connection("Connection reset by peer"))
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_select() {
        let client = MockDatabaseClient::new();
        let result = client.execute_query("SELECT 1").await.unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.columns.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_insert() {
        let client = MockDatabaseClient::new();
        let result = client
            .execute_query("INSERT INTO test VALUES (1)")
            .await
            .unwrap();
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.rows_affected, 0);
    }

    #[tokio::test]
    async fn test_scripted_responses() {
        let client = MockDatabaseClient::new()
            .on("UPDATE t SET a = 1", MockResponse::Rows(ResultSet::affected(3)))
            .on("SELECT x", MockResponse::QueryError("Invalid column name 'x'.".into()));

        let updated = client.execute_query("UPDATE t SET a = 1").await.unwrap();
        assert_eq!(updated.rows_affected, 3);

        let err = client.execute_query("SELECT x").await.unwrap_err();
        assert!(err.is_statement_error());
        assert!(client.is_live());

        assert_eq!(client.executed(), vec!["UPDATE t SET a = 1", "SELECT x"]);
    }

    #[tokio::test]
    async fn test_connection_error_closes_client() {
        let client =
            MockDatabaseClient::new().on("SELECT 1", MockResponse::ConnectionError("reset".into()));

        let err = client.execute_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, SqlDocxError::Connection(_)));
        assert!(!client.is_live());
        assert!(client.execute_query("SELECT 2").await.is_err());
    }

    #[tokio::test]
    async fn test_failing_client() {
        let client = FailingDatabaseClient::new();
        assert!(!client.is_live());
        let err = client.execute_query("SELECT 1").await.unwrap_err();
        assert!(!err.is_statement_error());
    }
}
