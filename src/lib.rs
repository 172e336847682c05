//! sqldocx - run SQL Server scripts and capture the results in a Word report.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod logging;
pub mod query;
pub mod report;
pub mod session;
