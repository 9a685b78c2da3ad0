//! Top-level lifecycle of one processing run.
//!
//! Selection is validated before anything touches disk; the workspace is then
//! prepared, the template resolved, and the selected stages dispatched in
//! catalog order.
use super::aux_files::copy_aux_files;
use super::context::{Workspace, WorkspaceContext};
use crate::error::WorkflowError;
use crate::scheduler::{for_each_selected, RunOutcome};
use crate::stage::{dispatch, ExternalStage, Stage, StageInvocation};
use crate::steps::{select_range, StageName};
use crate::template::TemplateResolver;
use crate::templates::DEFAULT_TEMPLATE_NAME;
use crate::util::{display_path, format_elapsed};
use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub custom_template: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub do_step: Option<String>,
}

/// Lifecycle of a run. `Failed` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Resolving,
    Scheduled,
    Running(StageName),
    Failed { stage: StageName, status: i32 },
    Completed,
}

impl RunState {
    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: RunState) -> Result<(), WorkflowError> {
        use RunState::*;
        let allowed = matches!(
            (*self, next),
            (NotStarted, Resolving)
                | (Resolving, Scheduled)
                | (Scheduled, Running(_))
                | (Running(_), Running(_))
                | (Running(_), Failed { .. })
                | (Running(_), Completed)
        );
        if !allowed {
            return Err(WorkflowError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => f.write_str("not started"),
            RunState::Resolving => f.write_str("resolving"),
            RunState::Scheduled => f.write_str("scheduled"),
            RunState::Running(stage) => write!(f, "running {stage}"),
            RunState::Failed { stage, status } => write!(f, "failed at {stage} ({status})"),
            RunState::Completed => f.write_str("completed"),
        }
    }
}

/// Run the workflow with the external stage programs.
pub fn run_workflow(request: &RunRequest, context: &WorkspaceContext) -> Result<RunOutcome> {
    drive(request, context, |name| Box::new(ExternalStage::new(name)))
}

/// Project name: the custom template's file stem.
fn project_name(custom: Option<&Path>) -> Option<String> {
    custom
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
}

pub(crate) fn drive<F>(
    request: &RunRequest,
    context: &WorkspaceContext,
    mut make_stage: F,
) -> Result<RunOutcome>
where
    F: FnMut(StageName) -> Box<dyn Stage>,
{
    let started = Instant::now();
    let mut state = RunState::NotStarted;
    let catalog = StageName::ALL;
    let selection = select_range(
        &catalog,
        request.start.as_deref(),
        request.end.as_deref(),
        request.do_step.as_deref(),
    )?;
    let selected = selection
        .stages(&catalog)
        .iter()
        .map(|stage| stage.as_str())
        .collect::<Vec<_>>();
    println!("Run processing on steps: [{}]", selected.join(", "));

    let custom_template = request
        .custom_template
        .as_deref()
        .filter(|path| {
            let is_default = path.file_name().is_some_and(|name| name == DEFAULT_TEMPLATE_NAME);
            if is_default {
                tracing::info!("input file is the default template, ignore it as custom template");
            }
            !is_default
        })
        .map(|path| context.absolute(path));
    let project = project_name(custom_template.as_deref());

    let workspace = Workspace::new(context.work_dir(request.work_dir.as_deref(), project.as_deref()));
    workspace.prepare()?;
    tracing::info!(dir = %workspace.root().display(), "work directory");

    state.advance(RunState::Resolving)?;
    let resolution = TemplateResolver::new(workspace.root()).resolve(custom_template.as_deref())?;
    tracing::info!(
        template = %display_path(&resolution.template_path, Some(context.cwd())),
        upgraded = resolution.upgraded,
        written = resolution.default_written,
        warnings = resolution.warnings.len(),
        "effective template"
    );

    state.advance(RunState::Scheduled)?;
    let project_dir = context.project_dir(project.as_deref());
    let invocation = StageInvocation {
        config: &resolution.effective,
        work_dir: workspace.root(),
        template_path: &resolution.template_path,
        custom_template: resolution.custom_path.as_deref(),
        project_name: project.as_deref(),
    };
    let outcome = for_each_selected(&selection, &catalog, |name| {
        state.advance(RunState::Running(name))?;
        if name == StageName::LoadData {
            if let Some(project_dir) = &project_dir {
                copy_aux_files(project_dir, workspace.root());
            }
        }
        let stage = make_stage(name);
        dispatch(stage.as_ref(), &invocation)
    })?;

    if let RunOutcome::Failed {
        stage,
        status,
        records,
    } = &outcome
    {
        state.advance(RunState::Failed {
            stage: *stage,
            status: *status,
        })?;
        let command = records
            .last()
            .and_then(|record| record.command.clone())
            .unwrap_or_default();
        return Err(WorkflowError::StageExecution {
            stage: *stage,
            command,
            status: *status,
        }
        .into());
    }

    state.advance(RunState::Completed)?;
    let records = outcome.records();
    let executed = records.iter().filter(|record| record.executed).count();
    tracing::info!(
        executed,
        skipped = records.len() - executed,
        "Total time: {}",
        format_elapsed(started.elapsed())
    );
    Ok(outcome)
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
