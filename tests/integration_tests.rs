//! Integration tests for sqldocx.
//!
//! Pipeline tests run against the in-memory mock client. SQL Server tests
//! require a running server; set MSSQL_TEST_URL to run them.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
