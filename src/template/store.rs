//! Template text format: parse, re-render over an existing layout, and
//! atomic persistence.
use super::Configuration;
use crate::error::WorkflowError;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

const APPENDED_MARKER: &str = "## options not present in the default template";

struct Line<'a> {
    key: &'a str,
    value: &'a str,
}

/// Split one template line. `Ok(None)` for blank and comment lines.
fn split_line(raw: &str) -> std::result::Result<Option<Line<'_>>, ()> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
        return Ok(None);
    }
    let (key, rest) = line.split_once('=').ok_or(())?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(());
    }
    let value = rest.split('#').next().unwrap_or_default().trim();
    Ok(Some(Line { key, value }))
}

/// Parse template text; `origin` is only used in error messages.
pub fn parse_template(text: &str, origin: &Path) -> Result<Configuration, WorkflowError> {
    let mut config = Configuration::new();
    for (idx, raw) in text.lines().enumerate() {
        let parsed = split_line(raw).map_err(|()| WorkflowError::ConfigParse {
            path: origin.to_path_buf(),
            line: idx + 1,
            content: raw.trim().to_string(),
        })?;
        // empty value means unset
        if let Some(line) = parsed.filter(|line| !line.value.is_empty()) {
            config.insert(line.key, line.value);
        }
    }
    Ok(config)
}

/// Read and parse a template file.
pub fn load_template(path: &Path) -> Result<Configuration> {
    if !path.is_file() {
        return Err(WorkflowError::NotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("read template {}", path.display()))?;
    Ok(parse_template(&text, path)?)
}

/// Rewrite `layout` with the values of `config`.
///
/// Key lines keep their column layout and trailing comments; keys missing
/// from the layout are appended after a marker comment.
pub fn render(layout: &str, config: &Configuration) -> String {
    let mut out = String::with_capacity(layout.len());
    let mut seen = Vec::new();
    for raw in layout.lines() {
        match split_line(raw) {
            Ok(Some(line)) if config.contains_key(line.key) => {
                let value = config.get(line.key).unwrap_or_default();
                out.push_str(&replace_value(raw, value));
                seen.push(line.key.to_string());
            }
            _ => out.push_str(raw),
        }
        out.push('\n');
    }

    let extra = config
        .iter()
        .filter(|(key, _)| !seen.iter().any(|seen_key| seen_key == key))
        .collect::<Vec<_>>();
    if !extra.is_empty() {
        if !layout.contains(APPENDED_MARKER) {
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            out.push_str(APPENDED_MARKER);
            out.push('\n');
        }
        for (key, value) in extra {
            out.push_str(&format!("{key} = {value}\n"));
        }
    }
    out
}

fn replace_value(raw: &str, value: &str) -> String {
    let Some((left, rest)) = raw.split_once('=') else {
        return raw.to_string();
    };
    let (body, comment) = match rest.find('#') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    let (lead, gap) = if body.trim().is_empty() {
        (body, "")
    } else {
        let value_start = body.len() - body.trim_start().len();
        let value_end = body.trim_end().len();
        (&body[..value_start], &body[value_end..])
    };
    let lead = if lead.is_empty() { " " } else { lead };
    let gap = if gap.is_empty() { "  " } else { gap };
    if comment.is_empty() {
        format!("{left}={lead}{value}")
    } else {
        format!("{left}={lead}{value}{gap}{comment}")
    }
}

/// Atomically replace `path` with `text` unless it already holds exactly that.
///
/// Returns whether the file was written.
pub fn write_if_changed(path: &Path, text: &str) -> Result<bool> {
    if let Ok(current) = fs::read_to_string(path) {
        if current == text {
            return Ok(false);
        }
    }
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(text.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    carry_mode(path, tmp.as_file())?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(true)
}

/// Give the replacement `path`'s current mode, or `0o644` for a new file.
#[cfg(unix)]
fn carry_mode(path: &Path, file: &fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o7777)
        .unwrap_or(0o644);
    file.set_permissions(fs::Permissions::from_mode(mode))
        .with_context(|| format!("set mode on {}", path.display()))
}

#[cfg(not(unix))]
fn carry_mode(_path: &Path, _file: &fs::File) -> Result<()> {
    Ok(())
}

/// Serialize `config` over the current contents of `path`.
pub fn persist(config: &Configuration, path: &Path) -> Result<bool> {
    let layout = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("read template {}", path.display()));
        }
    };
    write_if_changed(path, &render(&layout, config))
}
