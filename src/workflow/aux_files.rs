//! Optional supplementary files copied from the project scratch directory.
//!
//! Nothing here may abort a run: every failure is logged at debug level and
//! the file is left out.
use crate::staleness::{decide, Decision, FileArtifact};
use crate::util::copy_preserving_mtime;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

/// Patterns relative to `$SCRATCHDIR/<project>/`.
const AUX_PATTERNS: [&str; 3] = [
    "PROCESS/unavco_attributes.txt",
    "PROCESS/bl_list.txt",
    "SLC/summary*slc.jpg",
];

/// Copy each auxiliary file that is missing or stale in `work_dir`.
/// Returns the number of files copied.
pub fn copy_aux_files(project_dir: &Path, work_dir: &Path) -> usize {
    let mut copied = 0;
    for pattern in AUX_PATTERNS {
        let sources = match expand(project_dir, pattern) {
            Ok(sources) => sources,
            Err(err) => {
                tracing::debug!(pattern, error = %format!("{err:#}"), "skip auxiliary files");
                continue;
            }
        };
        for source in sources {
            match copy_if_stale(&source, work_dir) {
                Ok(true) => copied += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!(
                        file = %source.display(),
                        error = %format!("{err:#}"),
                        "skip auxiliary file"
                    );
                }
            }
        }
    }
    copied
}

fn expand(project_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = project_dir.join(pattern);
    let full = full
        .to_str()
        .ok_or_else(|| anyhow!("non UTF-8 path {}", full.display()))?;
    let paths = glob::glob(full).with_context(|| format!("bad pattern {full}"))?;
    Ok(paths.filter_map(|entry| entry.ok()).filter(|p| p.is_file()).collect())
}

fn copy_if_stale(source: &Path, work_dir: &Path) -> Result<bool> {
    let name = source
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {}", source.display()))?;
    let dest = FileArtifact::new(work_dir.join(name));
    let input = FileArtifact::new(source);
    if decide(&dest, &[&input], false) == Decision::Skip {
        return Ok(false);
    }
    copy_preserving_mtime(source, dest.path())?;
    tracing::info!(file = %name.to_string_lossy(), "copy auxiliary file");
    Ok(true)
}
