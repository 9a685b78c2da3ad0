//! Recognized option keys and the values they accept.
//!
//! Unknown keys are reported, never rejected: custom templates routinely carry
//! options for other tools.
use super::Configuration;
use std::fmt;

/// Shape of the values an option accepts once `auto` is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Flag,
    Choice(&'static [&'static str]),
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub key: &'static str,
    pub kind: ValueKind,
    /// Value `auto` stands for.
    pub auto: &'static str,
}

pub const KEY_SPECS: &[KeySpec] = &[
    KeySpec {
        key: "pysar.load.processor",
        kind: ValueKind::Choice(&["isce", "roipac", "gamma", "snap"]),
        auto: "isce",
    },
    KeySpec {
        key: "pysar.subset.yx",
        kind: ValueKind::Text,
        auto: "no",
    },
    KeySpec {
        key: "pysar.subset.lalo",
        kind: ValueKind::Text,
        auto: "no",
    },
    KeySpec {
        key: "pysar.unwrapError.method",
        kind: ValueKind::Choice(&["bridging", "phase_closure", "no"]),
        auto: "no",
    },
    KeySpec {
        key: "pysar.troposphericDelay.method",
        kind: ValueKind::Choice(&["pyaps", "height_correlation", "base_trop_cor", "no"]),
        auto: "pyaps",
    },
    KeySpec {
        key: "pysar.deramp",
        kind: ValueKind::Choice(&["no", "linear", "quadratic"]),
        auto: "no",
    },
    KeySpec {
        key: "pysar.topographicResidual",
        kind: ValueKind::Flag,
        auto: "yes",
    },
    KeySpec {
        key: "pysar.geocode",
        kind: ValueKind::Flag,
        auto: "yes",
    },
    KeySpec {
        key: "pysar.save.kmz",
        kind: ValueKind::Flag,
        auto: "yes",
    },
    KeySpec {
        key: "pysar.save.hdfEos5",
        kind: ValueKind::Flag,
        auto: "no",
    },
    KeySpec {
        key: "pysar.plot",
        kind: ValueKind::Flag,
        auto: "yes",
    },
];

pub(crate) fn spec_for(key: &str) -> Option<&'static KeySpec> {
    KEY_SPECS.iter().find(|spec| spec.key == key)
}

/// Problem found in an effective configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaWarning {
    UnknownKey {
        key: String,
        suggestion: Option<String>,
    },
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaWarning::UnknownKey {
                key,
                suggestion: Some(suggestion),
            } => write!(f, "unknown option `{key}` (did you mean `{suggestion}`?)"),
            SchemaWarning::UnknownKey {
                key,
                suggestion: None,
            } => write!(f, "unknown option `{key}`"),
            SchemaWarning::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "option `{key}` = `{value}` is not one of: {expected}"),
        }
    }
}

/// Check `config` against the schema and the shipped default's key set.
///
/// Only the `pysar.` namespace is checked for unknown keys.
pub fn check_keys(config: &Configuration, shipped: &Configuration) -> Vec<SchemaWarning> {
    let known = |key: &str| shipped.contains_key(key) || spec_for(key).is_some();
    let mut warnings = Vec::new();
    for (key, _) in config.iter() {
        if key.starts_with("pysar.") && !known(key) {
            let lowered = key.to_ascii_lowercase();
            let suggestion = shipped
                .keys()
                .chain(KEY_SPECS.iter().map(|spec| spec.key))
                .find(|candidate| candidate.to_ascii_lowercase() == lowered)
                .map(str::to_string);
            warnings.push(SchemaWarning::UnknownKey {
                key: key.to_string(),
                suggestion,
            });
        }
    }
    for spec in KEY_SPECS {
        let Some(value) = config.resolved(spec.key) else {
            continue;
        };
        let allowed: &[&str] = match spec.kind {
            ValueKind::Flag => &["yes", "no"],
            ValueKind::Choice(choices) => choices,
            ValueKind::Text => continue,
        };
        if !allowed.contains(&value) {
            warnings.push(SchemaWarning::InvalidValue {
                key: spec.key.to_string(),
                value: value.to_string(),
                expected: allowed.join(", "),
            });
        }
    }
    warnings
}
