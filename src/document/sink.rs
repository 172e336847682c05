//! Where reports land on disk and how existing reports are treated.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::docx::{extract_body, PreviousBody};
use crate::config::ExistingFilePolicy;
use crate::error::{Result, SqlDocxError};

/// How the invocation wants to treat an existing results document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Start a new document (run-all).
    Fresh,
    /// Add to the existing document (run-selection).
    Append,
}

/// Answer to "the results file already exists".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingFileChoice {
    Overwrite,
    Append,
    Cancel,
}

/// What `persist` will do with the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlan {
    /// Target does not exist yet.
    Create,
    /// Replace the target without a backup.
    Overwrite,
    /// Back up the target and write old plus new content.
    Append,
    /// Leave everything untouched.
    Cancel,
}

/// Asks the user what to do about an existing results file.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn choose(&self, target: &Path) -> Result<ExistingFileChoice>;
}

/// Interactive prompt on the terminal.
///
/// The read runs on the blocking pool so the runtime can still react to
/// interrupts while waiting for an answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

#[async_trait]
impl Prompter for StdinPrompter {
    async fn choose(&self, target: &Path) -> Result<ExistingFileChoice> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.display().to_string());

        tokio::task::spawn_blocking(move || {
            read_choice(&name, &mut io::stdin().lock(), &mut io::stderr())
        })
        .await
        .map_err(|e| SqlDocxError::internal(format!("Prompt task failed: {e}")))?
    }
}

/// Always gives the same answer. Used for non-interactive runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompter(pub ExistingFileChoice);

#[async_trait]
impl Prompter for FixedPrompter {
    async fn choose(&self, _target: &Path) -> Result<ExistingFileChoice> {
        Ok(self.0)
    }
}

/// Asks until the answer is understood. End of input means cancel.
fn read_choice<R: BufRead, W: Write>(
    name: &str,
    input: &mut R,
    output: &mut W,
) -> Result<ExistingFileChoice> {
    loop {
        write!(
            output,
            "File {name} already exists. Would you like to overwrite it or append to it? [o]verwrite/[a]ppend/[c]ancel: "
        )?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(ExistingFileChoice::Cancel);
        }
        match parse_choice(&line) {
            Some(choice) => return Ok(choice),
            None => writeln!(output, "Please answer overwrite, append or cancel.")?,
        }
    }
}

fn parse_choice(input: &str) -> Option<ExistingFileChoice> {
    match input.trim().to_lowercase().as_str() {
        "o" | "overwrite" => Some(ExistingFileChoice::Overwrite),
        "a" | "append" => Some(ExistingFileChoice::Append),
        "" | "c" | "cancel" => Some(ExistingFileChoice::Cancel),
        _ => None,
    }
}

/// Results document for a script: `<dir>/<stem>_results.docx`.
pub fn results_path(script: &Path) -> PathBuf {
    let stem = script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "query".to_string());
    script.with_file_name(format!("{stem}_results.docx"))
}

/// Backup location for `target`: `<dir>/<stem>_backup_<millis>.docx`.
pub fn backup_path(target: &Path, millis: i64) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{stem}_backup_{millis}.docx"))
}

/// Decides what to do with `target` before anything is executed.
pub async fn plan_write(
    target: &Path,
    mode: WriteMode,
    policy: ExistingFilePolicy,
    prompter: &dyn Prompter,
) -> Result<WritePlan> {
    if !target.exists() {
        return Ok(WritePlan::Create);
    }

    if mode == WriteMode::Append {
        return Ok(WritePlan::Append);
    }

    let choice = match policy {
        ExistingFilePolicy::Overwrite => ExistingFileChoice::Overwrite,
        ExistingFilePolicy::Append => ExistingFileChoice::Append,
        ExistingFilePolicy::Cancel => ExistingFileChoice::Cancel,
        ExistingFilePolicy::Prompt => prompter.choose(target).await?,
    };

    Ok(match choice {
        ExistingFileChoice::Overwrite => WritePlan::Overwrite,
        ExistingFileChoice::Append => WritePlan::Append,
        ExistingFileChoice::Cancel => WritePlan::Cancel,
    })
}

/// Reads the body of the existing report so appended sections can follow it.
///
/// Returns `None` (with a warning) when the file cannot be merged; the new
/// document then holds only the new sections and the backup keeps the rest.
pub fn load_previous(target: &Path) -> Result<Option<PreviousBody>> {
    if !target.exists() {
        return Ok(None);
    }

    let bytes = fs::read(target)
        .map_err(|e| SqlDocxError::io(format!("Failed to read {}: {e}", target.display())))?;

    match extract_body(&bytes) {
        Ok(Some(body)) => Ok(Some(body)),
        Ok(None) => {
            warn!(
                "{} references embedded parts; previous content is kept only in the backup",
                target.display()
            );
            Ok(None)
        }
        Err(e) => {
            warn!(
                "Could not read previous content of {}: {}; it is kept only in the backup",
                target.display(),
                e
            );
            Ok(None)
        }
    }
}

/// Writes `bytes` to `target` according to `plan`.
///
/// Returns the backup path when an existing file was moved aside.
pub fn persist(target: &Path, bytes: &[u8], plan: WritePlan) -> Result<Option<PathBuf>> {
    let backup = match plan {
        WritePlan::Cancel => {
            return Err(SqlDocxError::internal("persist called for a cancelled write"));
        }
        WritePlan::Append if target.exists() => {
            let backup = backup_path(target, Utc::now().timestamp_millis());
            fs::rename(target, &backup).map_err(|e| {
                SqlDocxError::io(format!(
                    "Failed to back up {} to {}: {e}",
                    target.display(),
                    backup.display()
                ))
            })?;
            info!("Backed up {} to {}", target.display(), backup.display());
            Some(backup)
        }
        WritePlan::Create | WritePlan::Overwrite | WritePlan::Append => None,
    };

    fs::write(target, bytes)
        .map_err(|e| SqlDocxError::io(format!("Failed to write {}: {e}", target.display())))?;
    info!("Results saved to {}", target.display());

    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct PanicPrompter;

    #[async_trait]
    impl Prompter for PanicPrompter {
        async fn choose(&self, _target: &Path) -> Result<ExistingFileChoice> {
            panic!("prompter should not be consulted");
        }
    }

    #[test]
    fn test_results_path() {
        assert_eq!(
            results_path(Path::new("/work/report.sql")),
            PathBuf::from("/work/report_results.docx")
        );
        assert_eq!(
            results_path(Path::new("monthly.totals.sql")),
            PathBuf::from("monthly.totals_results.docx")
        );
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/work/report_results.docx"), 1714555800000),
            PathBuf::from("/work/report_results_backup_1714555800000.docx")
        );
    }

    #[tokio::test]
    async fn test_missing_target_is_created_without_prompt() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a_results.docx");

        for mode in [WriteMode::Fresh, WriteMode::Append] {
            let plan = plan_write(&target, mode, ExistingFilePolicy::Prompt, &PanicPrompter)
                .await
                .unwrap();
            assert_eq!(plan, WritePlan::Create);
        }
    }

    #[tokio::test]
    async fn test_append_mode_never_prompts() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a_results.docx");
        fs::write(&target, b"old").unwrap();

        let plan = plan_write(&target, WriteMode::Append, ExistingFilePolicy::Prompt, &PanicPrompter)
            .await
            .unwrap();
        assert_eq!(plan, WritePlan::Append);
    }

    #[tokio::test]
    async fn test_fresh_mode_follows_policy_or_prompt() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a_results.docx");
        fs::write(&target, b"old").unwrap();

        let plan = plan_write(&target, WriteMode::Fresh, ExistingFilePolicy::Overwrite, &PanicPrompter)
            .await
            .unwrap();
        assert_eq!(plan, WritePlan::Overwrite);

        let plan = plan_write(
            &target,
            WriteMode::Fresh,
            ExistingFilePolicy::Prompt,
            &FixedPrompter(ExistingFileChoice::Cancel),
        )
        .await
        .unwrap();
        assert_eq!(plan, WritePlan::Cancel);

        let plan = plan_write(
            &target,
            WriteMode::Fresh,
            ExistingFilePolicy::Prompt,
            &FixedPrompter(ExistingFileChoice::Append),
        )
        .await
        .unwrap();
        assert_eq!(plan, WritePlan::Append);
    }

    #[test]
    fn test_persist_append_backs_up_existing_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a_results.docx");
        fs::write(&target, b"old").unwrap();

        let backup = persist(&target, b"new", WritePlan::Append).unwrap().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert_eq!(fs::read(&backup).unwrap(), b"old");
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("a_results_backup_"));
        assert!(name.ends_with(".docx"));
    }

    #[test]
    fn test_persist_overwrite_keeps_no_backup() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a_results.docx");
        fs::write(&target, b"old").unwrap();

        assert_eq!(persist(&target, b"new", WritePlan::Overwrite).unwrap(), None);
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_persist_cancel_is_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a_results.docx");
        assert!(persist(&target, b"new", WritePlan::Cancel).is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_load_previous_falls_back_on_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a_results.docx");
        assert_eq!(load_previous(&target).unwrap(), None);

        fs::write(&target, b"not a docx").unwrap();
        assert_eq!(load_previous(&target).unwrap(), None);
    }

    #[test]
    fn test_read_choice_repeats_until_understood() {
        let mut input = io::Cursor::new(b"maybe\nA\n".to_vec());
        let mut output = Vec::new();

        let choice = read_choice("a_results.docx", &mut input, &mut output).unwrap();

        assert_eq!(choice, ExistingFileChoice::Append);
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("File a_results.docx already exists.").count(), 2);
        assert!(shown.contains("Please answer overwrite, append or cancel."));
    }

    #[test]
    fn test_read_choice_end_of_input_cancels() {
        let mut input = io::Cursor::new(Vec::new());
        let choice = read_choice("a_results.docx", &mut input, &mut Vec::new()).unwrap();
        assert_eq!(choice, ExistingFileChoice::Cancel);
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("O\n"), Some(ExistingFileChoice::Overwrite));
        assert_eq!(parse_choice(" append "), Some(ExistingFileChoice::Append));
        assert_eq!(parse_choice(""), Some(ExistingFileChoice::Cancel));
        assert_eq!(parse_choice("maybe"), None);
    }
}
