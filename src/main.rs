use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

mod cli;
mod error;
mod scheduler;
mod stage;
mod staleness;
mod steps;
mod template;
mod templates;
mod util;
mod workflow;

use crate::cli::RootArgs;
use crate::error::WorkflowError;
use crate::workflow::{run_workflow, WorkspaceContext};

fn main() -> ExitCode {
    init_tracing();
    let args = RootArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let status = err
                .downcast_ref::<WorkflowError>()
                .map_or(1, WorkflowError::exit_status);
            ExitCode::from(status)
        }
    }
}

fn run(args: &RootArgs) -> Result<()> {
    if args.print_template {
        print!("{}", templates::DEFAULT_TEMPLATE);
        return Ok(());
    }
    if args.version {
        println!("pysar-app {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let context = WorkspaceContext::from_env()?;
    run_workflow(&args.run_request(), &context)?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pysar_app=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
