//! End-to-end runs against the mock database client.

use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use sqldocx::app::{run_all, run_selection, LineRange, RunOptions, RunOutcome, Selection};
use sqldocx::config::{ExistingFilePolicy, ReportConfig};
use sqldocx::db::{ColumnInfo, MockDatabaseClient, MockResponse, ResultSet, Value};
use sqldocx::document::{ExistingFileChoice, FixedPrompter};
use sqldocx::error::SqlDocxError;
use sqldocx::session::Session;
use tempfile::TempDir;

use super::document_xml;

const SCRIPT: &str = "-- monthly checks\nSELECT id, name FROM users;\nSELECT missing FROM users;\nUPDATE users SET active = 1 WHERE id = 2;\n";

fn scripted_client() -> MockDatabaseClient {
    MockDatabaseClient::new()
        .on(
            "-- monthly checks\nSELECT id, name FROM users",
            MockResponse::Rows(ResultSet::with_data(
                vec![ColumnInfo::new("id", "int"), ColumnInfo::new("name", "nvarchar")],
                vec![
                    vec![Value::Int(1), Value::String("Ada".into())],
                    vec![Value::Int(2), Value::Null],
                    vec![Value::Int(3), Value::String("Grace".into())],
                ],
            )),
        )
        .on(
            "SELECT missing FROM users",
            MockResponse::QueryError("Invalid column name 'missing'.".into()),
        )
        .on(
            "UPDATE users SET active = 1 WHERE id = 2",
            MockResponse::Rows(ResultSet::affected(1)),
        )
}

fn write_script(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("checks.sql");
    fs::write(&path, text).unwrap();
    path
}

fn options(max_rows: usize, on_existing: ExistingFilePolicy) -> RunOptions {
    RunOptions::from_config(&ReportConfig {
        max_rows,
        on_existing,
        connect_retries: 0,
    })
}

#[tokio::test]
async fn test_run_all_renders_every_outcome() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, SCRIPT);
    let mut session = Session::with_client(Box::new(scripted_client()));

    let outcome = run_all(
        &mut session,
        &script,
        &options(2, ExistingFilePolicy::Prompt),
        &FixedPrompter(ExistingFileChoice::Cancel),
    )
    .await
    .unwrap();

    let RunOutcome::Written {
        path,
        sections,
        errors,
        ..
    } = outcome
    else {
        panic!("Expected a written report");
    };
    assert_eq!(path, dir.path().join("checks_results.docx"));
    assert_eq!(sections, 3);
    assert_eq!(errors, 1);

    let xml = document_xml(&fs::read(&path).unwrap());
    assert!(xml.contains("SQL Query Results"));
    assert!(xml.contains("-- monthly checks"));
    assert!(xml.contains("Ada"));
    assert!(xml.contains("NULL"));
    assert!(!xml.contains("Grace"));
    assert!(xml.contains("... showing 2 of 3 results"));
    assert!(xml.contains("Invalid column name"));
    assert!(xml.contains("Rows affected: 1"));
    assert!(xml.contains("Query 3"));
}

#[tokio::test]
async fn test_overwrite_policy_replaces_report_without_backup() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "SELECT 1;");
    let target = dir.path().join("checks_results.docx");
    fs::write(&target, b"stale").unwrap();
    let mut session = Session::mock();

    let outcome = run_all(
        &mut session,
        &script,
        &options(10, ExistingFilePolicy::Overwrite),
        &FixedPrompter(ExistingFileChoice::Cancel),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, RunOutcome::Written { backup: None, .. }));
    assert_ne!(fs::read(&target).unwrap(), b"stale");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn test_selection_appends_after_previous_report() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, SCRIPT);
    let mut session = Session::with_client(Box::new(scripted_client()));
    let prompter = FixedPrompter(ExistingFileChoice::Cancel);

    run_all(
        &mut session,
        &script,
        &options(10, ExistingFilePolicy::Prompt),
        &prompter,
    )
    .await
    .unwrap();

    let outcome = run_selection(
        &mut session,
        &script,
        &Selection::Lines(LineRange { start: 4, end: 4 }),
        &options(10, ExistingFilePolicy::Prompt),
        &prompter,
    )
    .await
    .unwrap();

    let RunOutcome::Written {
        path,
        backup,
        merged,
        sections,
        ..
    } = outcome
    else {
        panic!("Expected a written report");
    };
    assert!(merged);
    assert_eq!(sections, 1);

    let backup = backup.expect("append should back up the previous report");
    let old = document_xml(&fs::read(&backup).unwrap());
    assert!(!old.contains("Appended Results"));

    let xml = document_xml(&fs::read(&path).unwrap());
    let title = xml.find("SQL Query Results").unwrap();
    let marker = xml.find("Appended Results - ").unwrap();
    let update = xml.rfind("UPDATE users SET active = 1").unwrap();
    assert!(title < marker && marker < update);
}

#[tokio::test]
async fn test_selection_without_existing_report_creates_one() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "SELECT 1;");
    let mut session = Session::mock();

    let outcome = run_selection(
        &mut session,
        &script,
        &Selection::Text("SELECT 42; SELECT 43".to_string()),
        &options(10, ExistingFilePolicy::Prompt),
        &FixedPrompter(ExistingFileChoice::Cancel),
    )
    .await
    .unwrap();

    let RunOutcome::Written {
        path,
        backup,
        merged,
        sections,
        ..
    } = outcome
    else {
        panic!("Expected a written report");
    };
    assert_eq!(backup, None);
    assert!(!merged);
    assert_eq!(sections, 2);
    assert!(document_xml(&fs::read(&path).unwrap()).contains("Mock result for: SELECT 42"));
}

#[tokio::test]
async fn test_connection_loss_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "SELECT 1;\nSELECT 2;\nSELECT 3;");
    let client = MockDatabaseClient::new().on(
        "SELECT 2",
        MockResponse::ConnectionError("Connection reset by peer".into()),
    );
    let mut session = Session::with_client(Box::new(client));

    let err = run_all(
        &mut session,
        &script,
        &options(10, ExistingFilePolicy::Prompt),
        &FixedPrompter(ExistingFileChoice::Overwrite),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        SqlDocxError::Aborted {
            completed: 1,
            total: 3,
            ..
        }
    ));
    assert!(!dir.path().join("checks_results.docx").exists());
}

#[tokio::test]
async fn test_missing_connection_is_reported_before_writing() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "SELECT 1;");
    let mut session = Session::new(None, 0);

    let err = run_all(
        &mut session,
        &script,
        &options(10, ExistingFilePolicy::Prompt),
        &FixedPrompter(ExistingFileChoice::Overwrite),
    )
    .await
    .unwrap_err();

    assert_eq!(err.category(), "Precondition Failed");
    assert!(!dir.path().join("checks_results.docx").exists());
}
