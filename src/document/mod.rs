//! Word document output.

pub mod docx;
pub mod sink;

pub use docx::{extract_body, render_docx, PreviousBody};
pub use sink::{
    backup_path, load_previous, persist, plan_write, results_path, ExistingFileChoice,
    FixedPrompter, Prompter, StdinPrompter, WriteMode, WritePlan,
};
