//! Default/custom template resolution.
//!
//! The work directory holds a copy of the shipped default template. Each run
//! upgrades that copy when the shipped version grew new keys, folds the custom
//! template into it, and exposes the normalized result as the effective
//! configuration.
use super::schema::{check_keys, SchemaWarning};
use super::store::{load_template, parse_template, persist, render, write_if_changed};
use super::Configuration;
use crate::staleness::{run_or_skip, Decision};
use crate::templates::{DEFAULT_TEMPLATE, DEFAULT_TEMPLATE_NAME};
use crate::util::copy_preserving_mtime;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Loose spellings accepted in templates, matched case-sensitively.
const VALUE_ALIASES: &[(&str, &str)] = &[
    ("def", "auto"),
    ("default", "auto"),
    ("y", "yes"),
    ("on", "yes"),
    ("true", "yes"),
    ("n", "no"),
    ("off", "no"),
    ("false", "no"),
];

/// Keys whose values are method names: lower-cased, hyphens become underscores.
const METHOD_KEYS: &[&str] = &["pysar.deramp", "pysar.troposphericDelay.method"];

/// Offsets read by the load stage only; never merged into the default template.
const LOAD_ONLY_KEYS: &[&str] = &["SUBSET_XMIN", "SUBSET_YMIN"];

/// Legacy option names copied onto their current key.
const KEY_ALIASES: &[(&str, &str)] = &[("processor", "pysar.load.processor")];

const SHIPPED_ORIGIN: &str = "<shipped default template>";

/// Canonicalize loosely typed values. Unknown keys and values pass through.
pub fn normalize(config: &Configuration) -> Configuration {
    config
        .iter()
        .map(|(key, value)| {
            let value = if METHOD_KEYS.contains(&key) {
                value.to_lowercase().replace('-', "_")
            } else {
                value.to_string()
            };
            let value = VALUE_ALIASES
                .iter()
                .find(|(alias, _)| *alias == value)
                .map_or(value, |(_, canonical)| canonical.to_string());
            (key, value)
        })
        .collect()
}

/// Compare the on-disk default copy with the shipped one.
///
/// The copy is obsolete when any shipped key is missing from it. The upgrade
/// keeps on-disk values for keys that still exist and takes shipped values
/// for new keys; keys dropped from the shipped template are discarded.
pub fn reconcile(on_disk: &Configuration, shipped: &Configuration) -> (bool, Configuration) {
    let needs_upgrade = shipped.keys().any(|key| !on_disk.contains_key(key));
    if !needs_upgrade {
        return (false, on_disk.clone());
    }
    let mut upgraded = shipped.clone();
    for (key, value) in on_disk.iter() {
        if shipped.contains_key(key) {
            upgraded.insert(key, value);
        }
    }
    (true, upgraded)
}

/// Copy legacy option names onto their current keys.
pub fn forward_aliases(config: &mut Configuration) {
    for (legacy, current) in KEY_ALIASES {
        if let Some(value) = config.get(legacy).map(str::to_string) {
            config.insert(*current, value);
        }
    }
}

/// Overlay `custom` on `default`; custom always wins and may add keys.
pub fn merge(default: &Configuration, custom: &Configuration) -> Configuration {
    let mut merged = default.clone();
    for (key, value) in custom.iter() {
        if !LOAD_ONLY_KEYS.contains(&key) {
            merged.insert(key, value);
        }
    }
    merged
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub effective: Configuration,
    pub template_path: PathBuf,
    pub custom_path: Option<PathBuf>,
    /// The on-disk default was obsolete and got replaced.
    pub upgraded: bool,
    /// The on-disk default file was written during this pass.
    pub default_written: bool,
    pub warnings: Vec<SchemaWarning>,
}

/// Sole writer of the work directory's template files.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    work_dir: PathBuf,
    shipped: String,
}

impl TemplateResolver {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_shipped(work_dir, DEFAULT_TEMPLATE)
    }

    /// Resolver using `shipped` in place of the embedded default template.
    pub fn with_shipped(work_dir: impl Into<PathBuf>, shipped: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            shipped: shipped.into(),
        }
    }

    /// Return the work directory's `pysarApp_template.txt` path.
    pub fn template_path(&self) -> PathBuf {
        self.work_dir.join(DEFAULT_TEMPLATE_NAME)
    }

    /// Return the `INPUTS/` directory where the custom template is backed up.
    pub fn inputs_dir(&self) -> PathBuf {
        self.work_dir.join("INPUTS")
    }

    pub fn load_default(&self) -> Result<Configuration> {
        Ok(parse_template(&self.shipped, Path::new(SHIPPED_ORIGIN))?)
    }

    pub fn load_custom(&self, path: Option<&Path>) -> Result<Option<Configuration>> {
        path.map(load_template).transpose()
    }

    /// Run a full resolution pass and return the effective configuration.
    pub fn resolve(&self, custom_path: Option<&Path>) -> Result<Resolution> {
        let shipped = self.load_default()?;
        let template_path = self.template_path();
        let mut default_written = false;
        let mut upgraded = false;

        let current = if template_path.is_file() {
            let on_disk = load_template(&template_path)?;
            let (needs_upgrade, reconciled) = reconcile(&on_disk, &shipped);
            if needs_upgrade {
                tracing::info!(
                    path = %template_path.display(),
                    "obsolete default template detected, update to the latest version"
                );
                let text = render(&self.shipped, &reconciled);
                default_written |= write_if_changed(&template_path, &text)?;
                upgraded = true;
            } else {
                tracing::info!(path = %template_path.display(), "latest template file detected");
            }
            reconciled
        } else {
            tracing::info!(
                path = %template_path.display(),
                "copy default template file to work directory"
            );
            default_written |= write_if_changed(&template_path, &self.shipped)?;
            shipped.clone()
        };

        let merged = match (custom_path, self.load_custom(custom_path)?) {
            (Some(path), Some(custom)) => {
                self.backup_custom(path)?;
                tracing::info!(path = %path.display(), "read custom template file");
                let mut custom = normalize(&custom);
                forward_aliases(&mut custom);
                let merged = merge(&current, &custom);
                tracing::info!("update default template based on input custom template");
                default_written |= persist(&merged, &template_path)?;
                merged
            }
            _ => current,
        };

        let effective = normalize(&merged);
        let warnings = check_keys(&effective, &shipped);
        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        Ok(Resolution {
            effective,
            template_path,
            custom_path: custom_path.map(Path::to_path_buf),
            upgraded,
            default_written,
            warnings,
        })
    }

    fn backup_custom(&self, custom_path: &Path) -> Result<()> {
        let Some(name) = custom_path.file_name() else {
            return Ok(());
        };
        let inputs_dir = self.inputs_dir();
        let dest = inputs_dir.join(name);
        if run_or_skip(&dest, &[custom_path.to_path_buf()], false) == Decision::Skip {
            return Ok(());
        }
        fs::create_dir_all(&inputs_dir)
            .with_context(|| format!("create {}", inputs_dir.display()))?;
        copy_preserving_mtime(custom_path, &dest)?;
        tracing::info!(
            file = %name.to_string_lossy(),
            "copy custom template to INPUTS directory"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
