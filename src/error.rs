//! Typed failures for template resolution and step scheduling.
//!
//! Everything else in the driver reports through `anyhow`; these variants are
//! the ones callers match on (exit status mapping, tests).
use crate::steps::StageName;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("malformed template line {line} in {}: `{content}`", path.display())]
    ConfigParse {
        path: PathBuf,
        line: usize,
        content: String,
    },
    #[error("template file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("input step not found: `{value}`\navailable steps: {available}")]
    UnknownStep { value: String, available: String },
    #[error("start step `{start}` comes after end step `{end}`")]
    InvalidRange { start: String, end: String },
    #[error(
        "step `{stage}` failed with exit status {status}\ncommand: {command}\nre-run it alone with: --dostep {stage}"
    )]
    StageExecution {
        stage: StageName,
        command: String,
        status: i32,
    },
    #[error("workflow state transition `{from}` -> `{to}` is invalid")]
    InvalidTransition { from: String, to: String },
}

impl WorkflowError {
    /// Process exit status to report for this failure.
    pub fn exit_status(&self) -> u8 {
        match self {
            WorkflowError::StageExecution { status, .. } => {
                u8::try_from((*status).clamp(1, 255)).unwrap_or(1)
            }
            _ => 1,
        }
    }
}
