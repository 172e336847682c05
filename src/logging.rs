//! Logging configuration for sqldocx.
//!
//! Logs go to stderr by default so stdout stays clean for `--json` output.
//! `--log-file` redirects them to a file instead, and a bare `--log-file`
//! uses [`default_log_path`].

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `path`, appending to an existing log.
///
/// Falls back to stderr when the file cannot be opened.
pub fn init_file_logging(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {e}", path.display());
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Default log file location.
///
/// Uses the XDG state directory on Linux (`~/.local/state/sqldocx/sqldocx.log`),
/// or falls back to the config directory on other platforms.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("sqldocx").join("sqldocx.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("sqldocx").join("sqldocx.log");
    }

    std::env::temp_dir().join("sqldocx.log")
}
