use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Show `path` relative to `base` when it lives underneath it.
pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

/// Copy a file and carry over its modification time.
///
/// Staleness checks compare mtimes, so a fresh mtime on the copy would make
/// the copy look newer than its source forever.
pub fn copy_preserving_mtime(source: &Path, dest: &Path) -> Result<()> {
    fs::copy(source, dest)
        .with_context(|| format!("copy {} to {}", source.display(), dest.display()))?;
    let modified = fs::metadata(source)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("inspect {}", source.display()))?;
    fs::File::options()
        .write(true)
        .open(dest)
        .and_then(|file| file.set_modified(modified))
        .with_context(|| format!("set mtime on {}", dest.display()))?;
    Ok(())
}

/// `MM mins SS.S secs`, as printed at the end of a run.
pub fn format_elapsed(elapsed: Duration) -> String {
    let tenths = (elapsed.as_millis() + 50) / 100;
    let (mins, secs) = (tenths / 600, tenths % 600);
    format!("{mins:02} mins {:02}.{} secs", secs / 10, secs % 10)
}
