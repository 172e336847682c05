//! Sequential batch execution.
//!
//! Runs split statements one at a time against a single connection. Statement
//! failures are captured as data; anything else stops the batch.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db::{DatabaseClient, QueryResult};
use crate::error::{Result, SqlDocxError};

/// A statement paired with the outcome of running it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub statement: String,
    pub result: QueryResult,
}

/// Runs statements strictly in order against one database client.
pub struct QueryExecutor<'a> {
    db: &'a dyn DatabaseClient,
    cancel: Option<CancellationToken>,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor.
    pub fn new(db: &'a dyn DatabaseClient) -> Self {
        Self { db, cancel: None }
    }

    /// Stops the batch between statements once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Executes every statement, in order, waiting for each result before the next.
    pub async fn run(&self, statements: &[String]) -> Result<Vec<ExecutedStatement>> {
        let total = statements.len();
        let mut executed = Vec::with_capacity(total);

        for (i, statement) in statements.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                warn!("Cancelled after {} of {} statements", executed.len(), total);
                return Err(SqlDocxError::Cancelled {
                    completed: executed.len(),
                    total,
                });
            }

            info!("Executing query {}/{}...", i + 1, total);
            let result = self.execute_one(statement).await.map_err(|e| {
                error!("Query {} failed to run: {}", i + 1, e);
                SqlDocxError::Aborted {
                    completed: executed.len(),
                    total,
                    reason: e.to_string(),
                }
            })?;

            executed.push(ExecutedStatement {
                statement: statement.clone(),
                result,
            });
        }

        Ok(executed)
    }

    /// Runs one statement, turning statement-level errors into `Failure` values.
    async fn execute_one(&self, statement: &str) -> Result<QueryResult> {
        match self.db.execute_query(statement).await {
            Ok(result) => Ok(QueryResult::Success(result)),
            Err(e) if e.is_statement_error() => {
                let message = match e {
                    SqlDocxError::Query(message) => message,
                    other => other.to_string(),
                };
                warn!("Statement failed: {}", message);
                Ok(QueryResult::Failure { message })
            }
            Err(e) => Err(e),
        }
    }
}
