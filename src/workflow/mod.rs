//! Workflow driver: workspace setup around the resolver and scheduler.
//!
//! The driver is glue. Template semantics live in `template`, stage
//! selection in `steps`, and the run/skip gate in `stage`.
mod aux_files;
mod context;
mod run;

pub use context::WorkspaceContext;
pub use run::{run_workflow, RunRequest};
