//! Report model and builder.
//!
//! Turns executed statements into a format-agnostic `Report`. The document
//! renderer consumes this structure; nothing here touches the file system.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::db::{QueryResult, Value};
use crate::query::ExecutedStatement;

/// Whether the report starts a new document or continues an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// New document with a title block.
    Fresh,
    /// Sections added after an "Appended Results" marker.
    Appended,
}

/// A complete report for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub mode: ReportMode,
    pub generated_at: DateTime<Local>,
    pub sections: Vec<ReportSection>,
}

impl Report {
    /// Timestamp as shown in the document.
    pub fn timestamp_label(&self) -> String {
        self.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Number of sections whose statement failed.
    pub fn error_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.outcome, SectionOutcome::Error { .. }))
            .count()
    }
}

/// One statement and how it went.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    /// 1-based position in the batch.
    pub index: usize,
    /// Statement text exactly as executed.
    pub statement: String,
    /// Configured row cap used for this section.
    pub max_rows: usize,
    pub outcome: SectionOutcome,
}

impl ReportSection {
    /// Statement text split into display lines.
    pub fn statement_lines(&self) -> impl Iterator<Item = &str> {
        self.statement.split('\n').map(|line| line.trim_end_matches('\r'))
    }
}

/// Rendered outcome of a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionOutcome {
    /// The statement failed; message is the server's text.
    Error { message: String },
    /// The statement succeeded without returning rows.
    AffectedRows { count: u64 },
    /// Preview of returned rows.
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        summary: RowSummary,
    },
}

/// Whether the preview shows every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowSummary {
    Truncated { displayed: usize, total: usize },
    Complete { total: usize },
}

/// Builds a report stamped with the current local time.
pub fn build_report(executed: &[ExecutedStatement], max_rows: usize, mode: ReportMode) -> Report {
    build_report_at(executed, max_rows, mode, Local::now())
}

/// Builds a report with an explicit generation time.
pub fn build_report_at(
    executed: &[ExecutedStatement],
    max_rows: usize,
    mode: ReportMode,
    generated_at: DateTime<Local>,
) -> Report {
    let sections = executed
        .iter()
        .enumerate()
        .map(|(i, item)| ReportSection {
            index: i + 1,
            statement: item.statement.clone(),
            max_rows,
            outcome: section_outcome(&item.result, max_rows),
        })
        .collect();

    Report {
        mode,
        generated_at,
        sections,
    }
}

fn section_outcome(result: &QueryResult, max_rows: usize) -> SectionOutcome {
    let result = match result {
        QueryResult::Failure { message } => {
            return SectionOutcome::Error {
                message: message.clone(),
            }
        }
        QueryResult::Success(result) => result,
    };

    if result.rows.is_empty() {
        return SectionOutcome::AffectedRows {
            count: result.rows_affected,
        };
    }

    let total = result.rows.len();
    let columns = result.columns.iter().map(|c| c.name.clone()).collect();
    let rows = result
        .rows
        .iter()
        .take(max_rows)
        .map(|row| row.iter().map(format_cell).collect())
        .collect();

    let summary = if total > max_rows {
        RowSummary::Truncated {
            displayed: max_rows,
            total,
        }
    } else {
        RowSummary::Complete { total }
    };

    SectionOutcome::Table {
        columns,
        rows,
        summary,
    }
}

/// Formats a cell value for the report.
///
/// NULL renders as `NULL`, booleans as `TRUE`/`FALSE` and date-typed values
/// as a `YYYY-MM-DD` calendar date.
pub fn format_cell(value: &Value) -> String {
    if let Some(date) = value.as_date() {
        return date.format("%Y-%m-%d").to_string();
    }
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_display_string(),
    }
}
