//! Run-all and run-selection commands.
//!
//! Both commands share one pipeline: split the script, decide what happens to
//! an existing results file, execute on the session's connection, build the
//! report, render it and persist it next to the script.

use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ExistingFilePolicy, ReportConfig};
use crate::document::{
    load_previous, persist, plan_write, render_docx, results_path, Prompter, WriteMode, WritePlan,
};
use crate::error::{Result, SqlDocxError};
use crate::query::{split_statements, QueryExecutor};
use crate::report::{build_report, Report, ReportMode};
use crate::session::Session;

/// Per-invocation settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_rows: usize,
    pub on_existing: ExistingFilePolicy,
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn from_config(report: &ReportConfig) -> Self {
        Self {
            max_rows: report.max_rows,
            on_existing: report.on_existing,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// 1-based inclusive line range of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl FromStr for LineRange {
    type Err = String;

    /// Accepts `A:B` or a single line number `A`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid line number: '{part}'"))
        };
        let (start, end) = match s.split_once(':') {
            Some((start, end)) => (parse(start)?, parse(end)?),
            None => {
                let line = parse(s)?;
                (line, line)
            }
        };
        if start == 0 || end < start {
            return Err(format!(
                "Invalid line range: '{s}'. Expected START:END with 1 <= START <= END"
            ));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// The part of a script to run with `run_selection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Lines(LineRange),
    Text(String),
}

/// What a command did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A report was written.
    Written {
        path: PathBuf,
        backup: Option<PathBuf>,
        /// Previous report content was carried into the new document.
        merged: bool,
        sections: usize,
        errors: usize,
        report: Report,
    },
    /// The user declined to touch the existing report; nothing ran.
    Cancelled { path: PathBuf },
}

/// Runs every statement of `script` into a fresh report.
pub async fn run_all(
    session: &mut Session,
    script: &Path,
    options: &RunOptions,
    prompter: &dyn Prompter,
) -> Result<RunOutcome> {
    let text = read_script(script)?;
    if text.trim().is_empty() {
        return Err(SqlDocxError::precondition("SQL file is empty."));
    }

    let statements = split_checked(&text)?;
    let target = results_path(script);
    let plan = plan_write(&target, WriteMode::Fresh, options.on_existing, prompter).await?;

    execute_and_write(session, &statements, &target, plan, options).await
}

/// Runs the selected part of `script` and appends it to the existing report.
pub async fn run_selection(
    session: &mut Session,
    script: &Path,
    selection: &Selection,
    options: &RunOptions,
    prompter: &dyn Prompter,
) -> Result<RunOutcome> {
    let selected = match selection {
        Selection::Lines(range) => {
            let text = read_script(script)?;
            select_lines(&text, *range)?
        }
        Selection::Text(text) => {
            check_script_path(script)?;
            text.clone()
        }
    };

    if selected.trim().is_empty() {
        return Err(SqlDocxError::precondition(
            "No query selected. Please select a SQL query.",
        ));
    }

    let statements = split_checked(&selected)?;
    let target = results_path(script);
    let plan = plan_write(&target, WriteMode::Append, options.on_existing, prompter).await?;

    execute_and_write(session, &statements, &target, plan, options).await
}

/// Extracts lines `range.start..=range.end` (1-based) from `text`.
pub fn select_lines(text: &str, range: LineRange) -> Result<String> {
    let lines: Vec<&str> = text.lines().collect();
    if range.start == 0 || range.end < range.start || range.end > lines.len() {
        return Err(SqlDocxError::precondition(format!(
            "Line range {range} is outside the script ({} lines).",
            lines.len()
        )));
    }
    Ok(lines[range.start - 1..range.end].join("\n"))
}

fn check_script_path(script: &Path) -> Result<()> {
    if !script.is_file() {
        return Err(SqlDocxError::precondition(format!(
            "No SQL file is open: {} does not exist.",
            script.display()
        )));
    }
    let is_sql = script
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"));
    if !is_sql {
        return Err(SqlDocxError::precondition("Active file is not a SQL file."));
    }
    Ok(())
}

fn read_script(script: &Path) -> Result<String> {
    check_script_path(script)?;
    fs::read_to_string(script)
        .map_err(|e| SqlDocxError::io(format!("Failed to read {}: {e}", script.display())))
}

fn split_checked(text: &str) -> Result<Vec<String>> {
    let statements = split_statements(text);
    if statements.is_empty() {
        return Err(SqlDocxError::precondition("No valid SQL queries found."));
    }
    info!("Found {} queries to execute", statements.len());
    Ok(statements)
}

async fn execute_and_write(
    session: &mut Session,
    statements: &[String],
    target: &Path,
    plan: WritePlan,
    options: &RunOptions,
) -> Result<RunOutcome> {
    if plan == WritePlan::Cancel {
        info!("Leaving {} untouched", target.display());
        return Ok(RunOutcome::Cancelled {
            path: target.to_path_buf(),
        });
    }

    let executed = {
        let db = session.ensure_connected().await?;
        let mut executor = QueryExecutor::new(db);
        if let Some(token) = &options.cancel {
            executor = executor.with_cancellation(token.clone());
        }
        executor.run(statements).await
    };
    session.refresh_status();
    let executed = executed?;

    let (mode, previous) = if plan == WritePlan::Append && target.exists() {
        (ReportMode::Appended, load_previous(target)?)
    } else {
        (ReportMode::Fresh, None)
    };

    let report = build_report(&executed, options.max_rows, mode);
    let bytes = render_docx(&report, previous.as_ref())?;
    let backup = persist(target, &bytes, plan)?;

    Ok(RunOutcome::Written {
        path: target.to_path_buf(),
        backup,
        merged: previous.is_some(),
        sections: report.sections.len(),
        errors: report.error_count(),
        report,
    })
}

/// Drives `run` while watching for interrupts.
///
/// `interrupt` resolves to `true` when an interrupt arrives and to `false`
/// when interrupts cannot be observed. The first interrupt cancels `token`
/// so the run stops after the current statement. A second one abandons the
/// run and returns `None`.
pub async fn run_until_interrupted<T, R, I, F>(
    run: R,
    token: CancellationToken,
    mut interrupt: I,
) -> Option<T>
where
    R: Future<Output = T>,
    I: FnMut() -> F,
    F: Future<Output = bool>,
{
    let watcher = async move {
        if interrupt().await {
            warn!("Interrupt received; stopping after the current statement (again to quit)");
            token.cancel();
            if interrupt().await {
                return;
            }
        }
        std::future::pending::<()>().await
    };

    tokio::pin!(run);
    tokio::select! {
        result = &mut run => Some(result),
        () = watcher => None,
    }
}
