//! Script splitting, statement classification and batch execution.

pub mod classify;
pub mod executor;
pub mod splitter;

pub use classify::{statement_kind, StatementKind};
pub use executor::{ExecutedStatement, QueryExecutor};
pub use splitter::split_statements;
