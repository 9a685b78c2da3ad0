use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Sub-directories every work directory carries.
const WORKSPACE_DIRS: [&str; 3] = ["GEOCODE", "INPUTS", "PIC"];

/// Process environment captured once at startup.
///
/// The driver reads the working directory and the scratch settings from here
/// and never from the live process, so a run leaves no ambient state behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    cwd: PathBuf,
    scratch_dir: Option<PathBuf>,
    auto_path: bool,
}

impl WorkspaceContext {
    pub fn new(cwd: PathBuf, scratch_dir: Option<PathBuf>, auto_path: bool) -> Self {
        Self {
            cwd,
            scratch_dir,
            auto_path,
        }
    }

    /// Snapshot `cwd`, `SCRATCHDIR` and `PYSAR_AUTO_PATH`.
    pub fn from_env() -> Result<Self> {
        let cwd = env::current_dir().context("read current directory")?;
        let scratch_dir = env::var_os("SCRATCHDIR")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let auto_path = env::var("PYSAR_AUTO_PATH")
            .map(|value| !matches!(value.trim().to_lowercase().as_str(), "no" | "false" | "0"))
            .unwrap_or(true);
        Ok(Self::new(cwd, scratch_dir, auto_path))
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Make `path` absolute against the captured working directory.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Return the `$SCRATCHDIR/<project>` path.
    pub fn project_dir(&self, project: Option<&str>) -> Option<PathBuf> {
        Some(self.scratch_dir.as_ref()?.join(project?))
    }

    /// Pick the work directory: explicit `--dir`, then the scratch-dir
    /// convention, then the captured working directory.
    pub fn work_dir(&self, explicit: Option<&Path>, project: Option<&str>) -> PathBuf {
        if let Some(dir) = explicit {
            return self.absolute(dir);
        }
        if self.auto_path {
            if let Some(project_dir) = self.project_dir(project) {
                return project_dir.join("PYSAR");
            }
        }
        self.cwd.clone()
    }
}

/// Path helper rooted at a run's work directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the work directory and its fixed sub-directories.
    pub fn prepare(&self) -> Result<()> {
        for dir in std::iter::once(self.root.clone())
            .chain(WORKSPACE_DIRS.iter().map(|name| self.root.join(name)))
        {
            if dir.is_dir() {
                continue;
            }
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
            tracing::info!(dir = %dir.display(), "create directory");
        }
        Ok(())
    }
}
