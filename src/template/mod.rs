//! Layered `key = value` templates and their resolution into the effective
//! configuration.
//!
//! `store` owns the text format, `schema` the recognized option keys, and
//! `resolve` the default/custom merge that every stage reads.
use indexmap::IndexMap;

mod resolve;
mod schema;
mod store;

pub use resolve::TemplateResolver;

/// Ordered option store keyed by dotted option names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    entries: IndexMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite; an existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Value with `auto` replaced by the schema default for the key. Absent
    /// keys fall back to the schema default too.
    pub fn resolved(&self, key: &str) -> Option<&str> {
        let spec = schema::spec_for(key);
        match self.get(key) {
            Some("auto") => Some(spec.map_or("auto", |spec| spec.auto)),
            Some(value) => Some(value),
            None => spec.map(|spec| spec.auto),
        }
    }

    /// Resolved `yes`/`no` option as a bool; anything else is `None`.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.resolved(key)? {
            "yes" => Some(true),
            "no" => Some(false),
            _ => None,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Configuration::new();
        for (key, value) in iter {
            config.insert(key, value);
        }
        config
    }
}
