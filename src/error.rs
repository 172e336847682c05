//! Error types for sqldocx.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for sqldocx operations.
#[derive(Error, Debug)]
pub enum SqlDocxError {
    /// Database connection errors (host unreachable, auth failed, dropped link, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution errors (syntax errors, constraint violations, permissions).
    #[error("Query error: {0}")]
    Query(String),

    /// Invocation preconditions that were not met (no script, empty input, etc.)
    #[error("{0}")]
    Precondition(String),

    /// Document rendering or parsing errors.
    #[error("Document error: {0}")]
    Document(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system errors while reading scripts or writing reports.
    #[error("I/O error: {0}")]
    Io(String),

    /// An infrastructure fault stopped the batch part-way through.
    #[error("Batch aborted after {completed} of {total} statements: {reason}")]
    Aborted {
        completed: usize,
        total: usize,
        reason: String,
    },

    /// The batch was cancelled between statements.
    #[error("Batch cancelled after {completed} of {total} statements")]
    Cancelled { completed: usize, total: usize },

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SqlDocxError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a precondition error with the given message.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Creates a document error with the given message.
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an I/O error with the given message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error belongs to a single statement rather than the batch.
    pub fn is_statement_error(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Precondition(_) => "Precondition Failed",
            Self::Document(_) => "Document Error",
            Self::Config(_) => "Configuration Error",
            Self::Io(_) => "I/O Error",
            Self::Aborted { .. } => "Batch Aborted",
            Self::Cancelled { .. } => "Batch Cancelled",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<std::io::Error> for SqlDocxError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias using SqlDocxError.
pub type Result<T> = std::result::Result<T, SqlDocxError>;
