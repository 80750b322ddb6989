//! `%placeholder%` expansion inside secret locator paths

use crate::{Result, SecretError, SecretSpec};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"%([A-Za-z_][A-Za-z0-9_.\-]*)%").expect("placeholder pattern is valid")
    })
}

/// Caller-supplied key/value pairs used to expand placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions {
    values: BTreeMap<String, String>,
}

impl Substitutions {
    /// Create an empty substitution map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a substitution
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a substitution value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Expand every `%key%` token in `text`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::SubstitutionUnresolved`] naming the first
    /// placeholder that has no value.
    pub fn expand(&self, name: &str, text: &str) -> Result<String> {
        let mut missing = None;
        let expanded = placeholder_pattern().replace_all(text, |caps: &Captures<'_>| {
            let key = &caps[1];
            self.get(key).map_or_else(
                || {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                },
                str::to_string,
            )
        });

        match missing {
            Some(placeholder) => Err(SecretError::SubstitutionUnresolved {
                name: name.to_string(),
                placeholder,
            }),
            None => Ok(expanded.into_owned()),
        }
    }

    /// Return a copy of `spec` with its path expanded.
    ///
    /// # Errors
    ///
    /// See [`Substitutions::expand`].
    pub fn apply(&self, spec: &SecretSpec) -> Result<SecretSpec> {
        Ok(SecretSpec {
            path: self.expand(&spec.name, &spec.path)?,
            ..spec.clone()
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Substitutions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Parse a single `key=value` definition.
///
/// Only the first `=` separates key from value, so values may contain `=`.
///
/// # Errors
///
/// Returns a message when the `=` is missing or the key is empty.
pub fn parse_definition(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        Some(_) => Err(format!("definition '{raw}' has an empty key")),
        None => Err(format!("definition '{raw}' must have the form key=value")),
    }
}
