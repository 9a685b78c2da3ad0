//! External stage programs and the run/skip gate in front of them.
//!
//! Each catalog entry is one external program invoked with the effective
//! template. Before running it, `dispatch` checks the stage's config toggle and
//! its declared artifacts with the staleness oracle.
use crate::scheduler::RunRecord;
use crate::staleness::{decide, hdf5_readable, Artifact, Decision, FileArtifact, ReadProbe};
use crate::steps::StageName;
use crate::template::Configuration;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Instant;

/// Everything a stage needs to build and run its command.
#[derive(Debug, Clone, Copy)]
pub struct StageInvocation<'a> {
    pub config: &'a Configuration,
    pub work_dir: &'a Path,
    pub template_path: &'a Path,
    pub custom_template: Option<&'a Path>,
    pub project_name: Option<&'a str>,
}

/// Work-dir relative files a stage reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageArtifacts {
    pub outputs: Vec<PathBuf>,
    pub inputs: Vec<PathBuf>,
    /// Outputs must pass the HDF5 readability probe to count as present.
    pub require_readable: bool,
}

/// One runnable catalog entry.
pub trait Stage {
    fn name(&self) -> StageName;

    /// Reason the configuration turns this stage off, if it does.
    fn disabled_by(&self, _config: &Configuration) -> Option<String> {
        None
    }

    fn artifacts(&self, _invocation: &StageInvocation<'_>) -> StageArtifacts {
        StageArtifacts::default()
    }

    fn command_line(&self, invocation: &StageInvocation<'_>) -> Vec<String>;

    /// Run the stage to completion and return its exit status.
    fn execute(&self, invocation: &StageInvocation<'_>) -> Result<i32>;
}

/// Stage backed by a program on `PATH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalStage {
    name: StageName,
}

impl ExternalStage {
    pub fn new(name: StageName) -> Self {
        Self { name }
    }

    /// Program implementing the stage under the given configuration.
    pub fn program(&self, config: &Configuration) -> &'static str {
        match self.name {
            StageName::LoadData => "load_data.py",
            StageName::RefPoint => "reference_point.py",
            StageName::Stacking => "temporal_average.py",
            StageName::UnwCor => "unwrap_error.py",
            StageName::NetModify => "modify_network.py",
            StageName::NetInversion => "ifgram_inversion.py",
            StageName::Tropo => match config.resolved(TROPO_METHOD) {
                Some("height_correlation") => "tropcor_phase_elevation.py",
                Some("base_trop_cor") => "tropo_base_trop_cor.py",
                _ => "tropo_pyaps.py",
            },
            StageName::Deramp => "remove_ramp.py",
            StageName::Topo => "dem_error.py",
            StageName::ResidRms => "timeseries_rms.py",
            StageName::RefDate => "reference_date.py",
            StageName::Ts2Vel => "timeseries2velocity.py",
            StageName::Geocode => "geocode.py",
            StageName::GoogleEarth => "save_kmz.py",
            StageName::HdfEos5 => "save_hdfeos5.py",
        }
    }

    /// Option key and resolved value that switch the stage off.
    fn toggle(&self) -> Option<Toggle> {
        let toggle = match self.name {
            StageName::UnwCor => Toggle::OffWhenNo("pysar.unwrapError.method"),
            StageName::Tropo => Toggle::OffWhenNo(TROPO_METHOD),
            StageName::Deramp => Toggle::OffWhenNo("pysar.deramp"),
            StageName::Topo => Toggle::OnWhenYes("pysar.topographicResidual"),
            StageName::Geocode => Toggle::OnWhenYes("pysar.geocode"),
            StageName::GoogleEarth => Toggle::OnWhenYes("pysar.save.kmz"),
            StageName::HdfEos5 => Toggle::OnWhenYes("pysar.save.hdfEos5"),
            _ => return None,
        };
        Some(toggle)
    }
}

const TROPO_METHOD: &str = "pysar.troposphericDelay.method";
const IFGRAM_STACK: &str = "INPUTS/ifgramStack.h5";

#[derive(Debug, Clone, Copy)]
enum Toggle {
    OffWhenNo(&'static str),
    OnWhenYes(&'static str),
}

impl Stage for ExternalStage {
    fn name(&self) -> StageName {
        self.name
    }

    fn disabled_by(&self, config: &Configuration) -> Option<String> {
        let (key, enabled) = match self.toggle()? {
            Toggle::OffWhenNo(key) => (key, config.resolved(key) != Some("no")),
            Toggle::OnWhenYes(key) => (key, config.flag(key) == Some(true)),
        };
        if enabled {
            return None;
        }
        let value = config.resolved(key).unwrap_or("unset");
        Some(format!("{key} = {value}"))
    }

    fn artifacts(&self, invocation: &StageInvocation<'_>) -> StageArtifacts {
        let paths = |rels: &[&str]| rels.iter().map(PathBuf::from).collect::<Vec<_>>();
        match self.name {
            StageName::LoadData => StageArtifacts {
                outputs: paths(&[IFGRAM_STACK]),
                inputs: vec![invocation.template_path.to_path_buf()],
                require_readable: true,
            },
            StageName::Stacking => StageArtifacts {
                outputs: paths(&["avgPhaseVelocity.h5"]),
                inputs: paths(&[IFGRAM_STACK]),
                require_readable: true,
            },
            StageName::NetInversion => StageArtifacts {
                outputs: paths(&["timeseries.h5", "temporalCoherence.h5"]),
                inputs: paths(&[IFGRAM_STACK]),
                require_readable: true,
            },
            _ => StageArtifacts::default(),
        }
    }

    fn command_line(&self, invocation: &StageInvocation<'_>) -> Vec<String> {
        let mut argv = vec![
            self.program(invocation.config).to_string(),
            "--template".to_string(),
            invocation.template_path.display().to_string(),
        ];
        if let Some(custom) = invocation.custom_template {
            argv.push(custom.display().to_string());
        }
        if let Some(project) = invocation.project_name {
            argv.push("--project".to_string());
            argv.push(project.to_string());
        }
        argv
    }

    fn execute(&self, invocation: &StageInvocation<'_>) -> Result<i32> {
        let argv = self.command_line(invocation);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command for step {}", self.name))?;
        let resolved = which::which(program)
            .with_context(|| format!("step {}: program `{program}` not found on PATH", self.name))?;
        let status = Command::new(&resolved)
            .args(args)
            .current_dir(invocation.work_dir)
            .status()
            .with_context(|| format!("run {}", resolved.display()))?;
        Ok(exit_code(status))
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

fn outputs_up_to_date(artifacts: &StageArtifacts, work_dir: &Path) -> bool {
    if artifacts.outputs.is_empty() {
        return false;
    }
    let probe: ReadProbe = hdf5_readable;
    let inputs = artifacts
        .inputs
        .iter()
        .map(|rel| FileArtifact::new(work_dir.join(rel)))
        .collect::<Vec<_>>();
    let inputs = inputs
        .iter()
        .map(|input| input as &dyn Artifact)
        .collect::<Vec<_>>();
    artifacts.outputs.iter().all(|rel| {
        let output = FileArtifact::with_probe(work_dir.join(rel), probe);
        decide(&output, &inputs, artifacts.require_readable) == Decision::Skip
    })
}

/// Evaluate one stage: honour its toggle and artifacts, otherwise run it.
pub fn dispatch(stage: &dyn Stage, invocation: &StageInvocation<'_>) -> Result<RunRecord> {
    let name = stage.name();
    if let Some(reason) = stage.disabled_by(invocation.config) {
        tracing::info!(step = %name, %reason, "skip step: turned off in template");
        return Ok(RunRecord::skipped(name));
    }
    let artifacts = stage.artifacts(invocation);
    if outputs_up_to_date(&artifacts, invocation.work_dir) {
        tracing::info!(step = %name, "skip step: outputs are up to date");
        return Ok(RunRecord::skipped(name));
    }

    let command = shell_words::join(stage.command_line(invocation));
    tracing::info!(step = %name, %command, "run step");
    let start = Instant::now();
    let status = stage.execute(invocation)?;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let record = RunRecord::executed(name, command, status);
    if record.failed() {
        tracing::warn!(step = %name, status, elapsed_ms, "step failed");
    } else {
        tracing::info!(step = %name, elapsed_ms, "step finished");
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::time::{Duration, SystemTime};

    const HDF5_HEADER: &[u8] = b"\x89HDF\r\n\x1a\npayload";

    struct Recording {
        name: StageName,
        runs: Cell<usize>,
        artifacts: StageArtifacts,
    }

    impl Stage for Recording {
        fn name(&self) -> StageName {
            self.name
        }

        fn artifacts(&self, _invocation: &StageInvocation<'_>) -> StageArtifacts {
            self.artifacts.clone()
        }

        fn command_line(&self, _invocation: &StageInvocation<'_>) -> Vec<String> {
            vec!["fake.py".to_string(), "--template".to_string(), "a b.txt".to_string()]
        }

        fn execute(&self, _invocation: &StageInvocation<'_>) -> Result<i32> {
            self.runs.set(self.runs.get() + 1);
            Ok(0)
        }
    }

    fn invocation<'a>(config: &'a Configuration, work_dir: &'a Path) -> StageInvocation<'a> {
        StageInvocation {
            config,
            work_dir,
            template_path: Path::new("/work/pysarApp_template.txt"),
            custom_template: None,
            project_name: None,
        }
    }

    fn set_mtime(path: &Path, secs: u64) {
        fs::File::options()
            .write(true)
            .open(path)
            .and_then(|file| file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)))
            .expect("set mtime");
    }

    #[test]
    fn command_line_carries_template_custom_and_project() {
        let config = Configuration::new();
        let custom = Path::new("/data/GalapagosSenDT128.template");
        let invocation = StageInvocation {
            custom_template: Some(custom),
            project_name: Some("GalapagosSenDT128"),
            ..invocation(&config, Path::new("/work"))
        };
        assert_eq!(
            ExternalStage::new(StageName::LoadData).command_line(&invocation),
            vec![
                "load_data.py",
                "--template",
                "/work/pysarApp_template.txt",
                "/data/GalapagosSenDT128.template",
                "--project",
                "GalapagosSenDT128",
            ]
        );
    }

    #[test]
    fn tropo_program_follows_method() {
        let stage = ExternalStage::new(StageName::Tropo);
        let mut config = Configuration::new();
        config.insert(TROPO_METHOD, "auto");
        assert_eq!(stage.program(&config), "tropo_pyaps.py");
        config.insert(TROPO_METHOD, "height_correlation");
        assert_eq!(stage.program(&config), "tropcor_phase_elevation.py");
    }

    #[test]
    fn toggles_follow_resolved_values() {
        let mut config: Configuration = [
            ("pysar.deramp", "auto"),
            ("pysar.topographicResidual", "auto"),
            ("pysar.save.hdfEos5", "auto"),
            ("pysar.troposphericDelay.method", "no"),
        ]
        .into_iter()
        .collect();
        let disabled = |config: &Configuration, name| ExternalStage::new(name).disabled_by(config);

        assert_eq!(
            disabled(&config, StageName::Deramp).as_deref(),
            Some("pysar.deramp = no")
        );
        assert_eq!(disabled(&config, StageName::Topo), None);
        assert!(disabled(&config, StageName::HdfEos5).is_some());
        assert!(disabled(&config, StageName::Tropo).is_some());
        assert_eq!(disabled(&config, StageName::LoadData), None);

        config.insert("pysar.deramp", "quadratic");
        config.insert("pysar.save.hdfEos5", "yes");
        assert_eq!(disabled(&config, StageName::Deramp), None);
        assert_eq!(disabled(&config, StageName::HdfEos5), None);
    }

    #[test]
    fn disabled_stage_is_recorded_without_running() {
        let config: Configuration = [("pysar.deramp", "no")].into_iter().collect();
        let dir = tempfile::tempdir().expect("tempdir");
        let record = dispatch(
            &ExternalStage::new(StageName::Deramp),
            &invocation(&config, dir.path()),
        )
        .expect("dispatch");
        assert_eq!(record, RunRecord::skipped(StageName::Deramp));
    }

    #[test]
    fn fresh_readable_outputs_skip_and_stale_outputs_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Configuration::new();
        let input = dir.path().join("INPUTS").join("ifgramStack.h5");
        let output = dir.path().join("timeseries.h5");
        fs::create_dir_all(input.parent().expect("parent")).expect("mkdir");
        fs::write(&input, HDF5_HEADER).expect("write input");
        fs::write(&output, HDF5_HEADER).expect("write output");
        set_mtime(&input, 100);
        set_mtime(&output, 200);

        let stage = Recording {
            name: StageName::NetInversion,
            runs: Cell::new(0),
            artifacts: StageArtifacts {
                outputs: vec![PathBuf::from("timeseries.h5")],
                inputs: vec![PathBuf::from("INPUTS/ifgramStack.h5")],
                require_readable: true,
            },
        };
        let record = dispatch(&stage, &invocation(&config, dir.path())).expect("dispatch");
        assert!(!record.executed);
        assert_eq!(stage.runs.get(), 0);

        set_mtime(&input, 300);
        let record = dispatch(&stage, &invocation(&config, dir.path())).expect("dispatch");
        assert!(record.executed);
        assert_eq!(record.command.as_deref(), Some("fake.py --template 'a b.txt'"));
        assert_eq!(stage.runs.get(), 1);
    }

    #[test]
    fn unreadable_output_forces_a_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Configuration::new();
        fs::write(dir.path().join("avgPhaseVelocity.h5"), b"truncated").expect("write");
        let stage = Recording {
            name: StageName::Stacking,
            runs: Cell::new(0),
            artifacts: StageArtifacts {
                outputs: vec![PathBuf::from("avgPhaseVelocity.h5")],
                inputs: Vec::new(),
                require_readable: true,
            },
        };
        let record = dispatch(&stage, &invocation(&config, dir.path())).expect("dispatch");
        assert!(record.executed);
        assert_eq!(stage.runs.get(), 1);
    }

    #[test]
    fn stages_without_outputs_always_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Configuration::new();
        let stage = Recording {
            name: StageName::RefPoint,
            runs: Cell::new(0),
            artifacts: StageArtifacts::default(),
        };
        dispatch(&stage, &invocation(&config, dir.path())).expect("first");
        dispatch(&stage, &invocation(&config, dir.path())).expect("second");
        assert_eq!(stage.runs.get(), 2);
    }

    #[test]
    fn artifact_table_covers_hdf5_producing_stages() {
        let config = Configuration::new();
        let work = Path::new("/work");
        let inv = invocation(&config, work);
        let artifacts = |name| ExternalStage::new(name).artifacts(&inv);

        assert_eq!(
            artifacts(StageName::LoadData),
            StageArtifacts {
                outputs: vec![PathBuf::from("INPUTS/ifgramStack.h5")],
                inputs: vec![PathBuf::from("/work/pysarApp_template.txt")],
                require_readable: true,
            }
        );
        assert_eq!(
            artifacts(StageName::Stacking),
            StageArtifacts {
                outputs: vec![PathBuf::from("avgPhaseVelocity.h5")],
                inputs: vec![PathBuf::from("INPUTS/ifgramStack.h5")],
                require_readable: true,
            }
        );
        assert_eq!(
            artifacts(StageName::NetInversion),
            StageArtifacts {
                outputs: vec![
                    PathBuf::from("timeseries.h5"),
                    PathBuf::from("temporalCoherence.h5"),
                ],
                inputs: vec![PathBuf::from("INPUTS/ifgramStack.h5")],
                require_readable: true,
            }
        );
        assert_eq!(artifacts(StageName::RefPoint), StageArtifacts::default());
    }

    #[test]
    fn net_inversion_reruns_until_every_output_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Configuration::new();
        let inv = invocation(&config, dir.path());
        let artifacts = ExternalStage::new(StageName::NetInversion).artifacts(&inv);

        fs::create_dir_all(dir.path().join("INPUTS")).expect("mkdir");
        let stack = dir.path().join("INPUTS/ifgramStack.h5");
        fs::write(&stack, HDF5_HEADER).expect("write stack");
        set_mtime(&stack, 100);
        let timeseries = dir.path().join("timeseries.h5");
        fs::write(&timeseries, HDF5_HEADER).expect("write timeseries");
        set_mtime(&timeseries, 200);
        assert!(!outputs_up_to_date(&artifacts, dir.path()));

        let coherence = dir.path().join("temporalCoherence.h5");
        fs::write(&coherence, HDF5_HEADER).expect("write coherence");
        set_mtime(&coherence, 200);
        assert!(outputs_up_to_date(&artifacts, dir.path()));
    }
}
