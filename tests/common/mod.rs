//! Shared test infrastructure for integration tests.
//!
//! Each sandbox owns a work directory and a `bin/` directory of fake stage
//! programs. Every fake program appends its name and arguments to `calls.log`
//! and exits with the status it was created with.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Every program a stage can dispatch to.
pub const STAGE_PROGRAMS: &[&str] = &[
    "load_data.py",
    "reference_point.py",
    "temporal_average.py",
    "unwrap_error.py",
    "modify_network.py",
    "ifgram_inversion.py",
    "tropo_pyaps.py",
    "tropcor_phase_elevation.py",
    "tropo_base_trop_cor.py",
    "remove_ramp.py",
    "dem_error.py",
    "timeseries_rms.py",
    "reference_date.py",
    "timeseries2velocity.py",
    "geocode.py",
    "save_kmz.py",
    "save_hdfeos5.py",
];

pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    /// Sandbox where every stage program succeeds.
    pub fn new() -> Self {
        let sandbox = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        fs::create_dir_all(sandbox.bin_dir()).expect("create bin dir");
        fs::create_dir_all(sandbox.work_dir()).expect("create work dir");
        for program in STAGE_PROGRAMS {
            sandbox.fake_program(program, 0);
        }
        sandbox
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Replace `program` with a script exiting `status`.
    pub fn fake_program(&self, program: &str, status: i32) {
        self.fake_script(program, &format!("exit {status}"));
    }

    /// Replace `program` with a script that logs its call and then runs `body`.
    pub fn fake_script(&self, program: &str, body: &str) {
        let path = self.bin_dir().join(program);
        let script = format!(
            "#!/bin/sh\necho \"{program} $*\" >> '{}'\n{body}\n",
            self.log_path().display()
        );
        fs::write(&path, script).expect("write fake program");
        let mut perms = fs::metadata(&path).expect("stat").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
    }

    /// Write a file relative to the sandbox root.
    pub fn write(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, text).expect("write file");
        path
    }

    /// Program names invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect()
    }

    /// Full logged command lines.
    pub fn call_lines(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command(&self.work_dir(), args)
            .output()
            .expect("run pysar-app")
    }

    pub fn command(&self, cwd: &Path, args: &[&str]) -> Command {
        let path = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![self.bin_dir()];
        paths.extend(std::env::split_paths(&path));
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pysar-app"));
        cmd.args(args)
            .current_dir(cwd)
            .env("PATH", std::env::join_paths(paths).expect("join PATH"))
            .env_remove("SCRATCHDIR")
            .env_remove("PYSAR_AUTO_PATH")
            .env("RUST_LOG", "pysar_app=info");
        cmd
    }
}
