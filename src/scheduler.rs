//! Sequential dispatch over a stage selection.
//!
//! Stages run one at a time in catalog order and the first non-zero exit
//! status ends the run. Whether a stage does real work is the stage's own
//! decision; the scheduler only decides which stages are dispatched at all.
use crate::steps::{StageName, StageSelection};
use anyhow::Result;

/// What happened to one stage during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub stage: StageName,
    pub executed: bool,
    pub exit_status: Option<i32>,
    pub command: Option<String>,
}

impl RunRecord {
    /// Stage evaluated but not executed (disabled or up to date).
    pub fn skipped(stage: StageName) -> Self {
        Self {
            stage,
            executed: false,
            exit_status: None,
            command: None,
        }
    }

    pub fn executed(stage: StageName, command: String, exit_status: i32) -> Self {
        Self {
            stage,
            executed: true,
            exit_status: Some(exit_status),
            command: Some(command),
        }
    }

    pub fn failed(&self) -> bool {
        self.exit_status.is_some_and(|status| status != 0)
    }
}

/// Terminal result of a scheduled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        records: Vec<RunRecord>,
    },
    Failed {
        stage: StageName,
        status: i32,
        records: Vec<RunRecord>,
    },
}

impl RunOutcome {
    pub fn records(&self) -> &[RunRecord] {
        match self {
            RunOutcome::Completed { records } | RunOutcome::Failed { records, .. } => records,
        }
    }
}

/// Dispatch each selected stage in catalog order, stopping at the first
/// non-zero exit status. Errors from `dispatch` propagate unchanged.
pub fn for_each_selected<F>(
    selection: &StageSelection,
    catalog: &[StageName],
    mut dispatch: F,
) -> Result<RunOutcome>
where
    F: FnMut(StageName) -> Result<RunRecord>,
{
    let mut records = Vec::with_capacity(selection.len());
    for &stage in selection.stages(catalog) {
        let record = dispatch(stage)?;
        let failed = record.exit_status.filter(|status| *status != 0);
        records.push(record);
        if let Some(status) = failed {
            return Ok(RunOutcome::Failed {
                stage,
                status,
                records,
            });
        }
    }
    Ok(RunOutcome::Completed { records })
}
