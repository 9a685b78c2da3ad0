//! CLI argument parsing for the processing workflow.
//!
//! The CLI only gathers selectors and paths; all policy lives in the driver.
use crate::workflow::RunRequest;
use clap::Parser;
use std::path::PathBuf;

const AFTER_HELP: &str = "\
Steps (in order):
  loadData refPoint stacking unwCor netModify netInversion tropo deramp
  topo residRms refDate ts2vel geocode googleEarth hdfEos5

Examples:
  pysar-app                                         Run / rerun in the current directory
  pysar-app GalapagosSenDT128.template              Run / rerun with a custom template
  pysar-app -H                                      Print all template options
  pysar-app GalapagosSenDT128.template --end loadData   Stop after loading data
  pysar-app GalapagosSenDT128.template --dostep tropo   Run the tropo step only

Environment:
  SCRATCHDIR        work in $SCRATCHDIR/<project>/PYSAR when --dir is not given
  PYSAR_AUTO_PATH   set to no to disable the SCRATCHDIR rule
  RUST_LOG          log filter (default: pysar_app=info)";

/// Root CLI entrypoint for a routine time-series run.
#[derive(Parser, Debug)]
#[command(
    name = "pysar-app",
    about = "Routine InSAR time-series workflow driver",
    after_help = AFTER_HELP,
    disable_version_flag = true
)]
pub struct RootArgs {
    /// Custom template with option settings (ignored if it is pysarApp_template.txt)
    #[arg(value_name = "TEMPLATE")]
    pub custom_template: Option<PathBuf>,

    /// Working directory (default: current directory or $SCRATCHDIR/<project>/PYSAR)
    #[arg(long = "dir", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Print the default template with every option and exit
    #[arg(short = 'H')]
    pub print_template: bool,

    /// Print the version and exit
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Start processing at the named step (default: loadData)
    #[arg(long, short = 's', value_name = "STEP", help_heading = "Steps")]
    pub start: Option<String>,

    /// End processing at the named step, inclusive (default: hdfEos5)
    #[arg(long, short = 'e', value_name = "STEP", help_heading = "Steps")]
    pub end: Option<String>,

    /// Run processing only at the named step
    #[arg(long, value_name = "STEP", help_heading = "Steps")]
    pub dostep: Option<String>,
}

impl RootArgs {
    pub fn run_request(&self) -> RunRequest {
        RunRequest {
            custom_template: self.custom_template.clone(),
            work_dir: self.work_dir.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            do_step: self.dostep.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selectors_and_template() {
        let args = RootArgs::try_parse_from([
            "pysar-app",
            "GalapagosSenDT128.template",
            "--dir",
            "PYSAR",
            "-s",
            "tropo",
            "--end",
            "topo",
        ])
        .expect("parse");
        let request = args.run_request();
        assert_eq!(
            request.custom_template,
            Some(PathBuf::from("GalapagosSenDT128.template"))
        );
        assert_eq!(request.work_dir, Some(PathBuf::from("PYSAR")));
        assert_eq!(request.start.as_deref(), Some("tropo"));
        assert_eq!(request.end.as_deref(), Some("topo"));
        assert_eq!(request.do_step, None);
    }

    #[test]
    fn lowercase_v_is_version() {
        let args = RootArgs::try_parse_from(["pysar-app", "-v"]).expect("parse");
        assert!(args.version);
        assert!(!args.print_template);
    }
}
