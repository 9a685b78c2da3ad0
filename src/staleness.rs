//! Run-or-skip decisions from artifact modification times.
//!
//! The decision is pure: callers snapshot the filesystem into [`Artifact`]s
//! and perform any copy or regeneration themselves.
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Outcome of a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run,
    Skip,
}

/// A file-system object the oracle can reason about.
pub trait Artifact {
    /// Modification time, or `None` when the artifact does not exist.
    fn modified(&self) -> Option<SystemTime>;

    /// Whether the caller's readability probe accepts the artifact.
    fn is_readable(&self) -> bool {
        self.modified().is_some()
    }
}

/// Decide whether `output` must be regenerated from `inputs`.
///
/// Missing inputs never force a run; only an existing input strictly newer
/// than the output does.
pub fn decide(output: &dyn Artifact, inputs: &[&dyn Artifact], require_readable: bool) -> Decision {
    let Some(output_time) = output.modified() else {
        return Decision::Run;
    };
    if require_readable && !output.is_readable() {
        return Decision::Run;
    }
    let newer_input = inputs
        .iter()
        .filter_map(|input| input.modified())
        .any(|input_time| input_time > output_time);
    if newer_input {
        Decision::Run
    } else {
        Decision::Skip
    }
}

/// Readability probe applied to an existing file.
pub type ReadProbe = fn(&Path) -> bool;

/// Artifact backed by a path, snapshotted at construction.
#[derive(Debug, Clone)]
pub struct FileArtifact {
    path: PathBuf,
    modified: Option<SystemTime>,
    readable: bool,
}

impl FileArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_probe(path, |path| fs::File::open(path).is_ok())
    }

    pub fn with_probe(path: impl Into<PathBuf>, probe: ReadProbe) -> Self {
        let path = path.into();
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok();
        let readable = modified.is_some() && probe(&path);
        Self {
            path,
            modified,
            readable,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Artifact for FileArtifact {
    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    fn is_readable(&self) -> bool {
        self.readable
    }
}

const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// Probe for HDF5 outputs: the file must start with the HDF5 signature.
pub fn hdf5_readable(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut header = [0u8; 8];
    file.read_exact(&mut header).is_ok() && header == HDF5_SIGNATURE
}

/// Path-level shortcut for the common one-output case.
pub fn run_or_skip(output: &Path, inputs: &[PathBuf], require_readable: bool) -> Decision {
    let output = FileArtifact::new(output);
    let inputs = inputs
        .iter()
        .map(|path| FileArtifact::new(path.as_path()))
        .collect::<Vec<_>>();
    let refs = inputs.iter().map(|input| input as &dyn Artifact).collect::<Vec<_>>();
    decide(&output, &refs, require_readable)
}
