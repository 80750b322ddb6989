//! Secret declarations and their material-type tags

use crate::{Result, SecretError};

/// A single tag attached to a manifest entry.
///
/// Tags are written as a YAML local tag whose components are joined with
/// `:`, e.g. `!var:file` or `!str:default='fallback'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretTag {
    /// Resolve the path through the provider
    Var,
    /// Materialize the value as a temporary file
    File,
    /// Treat the value as a literal (the implicit behaviour for untagged entries)
    Literal,
    /// Fallback literal used when no explicit value is available
    Default(String),
}

/// Declaration of one secret from the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    /// Environment variable name the secret is exposed as
    pub name: String,
    /// Provider locator for `Var` secrets, the literal value otherwise
    pub path: String,
    /// Material-type tags
    pub tags: Vec<SecretTag>,
}

impl SecretSpec {
    /// Create a provider-backed secret
    #[must_use]
    pub fn var(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            tags: vec![SecretTag::Var],
        }
    }

    /// Create a literal secret
    #[must_use]
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: value.into(),
            tags: Vec::new(),
        }
    }

    /// Add a tag, returning the updated spec
    #[must_use]
    pub fn with_tag(mut self, tag: SecretTag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Whether the value comes from the provider
    #[must_use]
    pub fn is_var(&self) -> bool {
        self.tags.contains(&SecretTag::Var)
    }

    /// Whether the value is materialized as a file
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.tags.contains(&SecretTag::File)
    }

    /// The fallback literal, if one was declared
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.tags.iter().find_map(|tag| match tag {
            SecretTag::Default(value) => Some(value.as_str()),
            _ => None,
        })
    }

    /// The value of a literal entry: the explicit literal wins over the default.
    #[must_use]
    pub fn literal_value(&self) -> &str {
        if self.path.is_empty() {
            self.default_value().unwrap_or_default()
        } else {
            &self.path
        }
    }
}

/// Parse a raw YAML tag such as `!var:file` into its components.
///
/// # Errors
///
/// Returns [`SecretError::UnknownTag`] for any component other than `var`,
/// `file`, `str` or `default=...`.
pub fn parse_tags(name: &str, raw: &str) -> Result<Vec<SecretTag>> {
    let mut tags = Vec::new();
    let mut rest = raw.trim_start_matches('!');

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("default=") {
            let (value, remaining) = split_default(name, after)?;
            tags.push(SecretTag::Default(value));
            rest = remaining;
            continue;
        }

        let (word, remaining) = rest.split_once(':').unwrap_or((rest, ""));
        let tag = match word {
            "var" => SecretTag::Var,
            "file" => SecretTag::File,
            "str" => SecretTag::Literal,
            other => {
                return Err(SecretError::UnknownTag {
                    name: name.to_string(),
                    tag: other.to_string(),
                });
            }
        };
        tags.push(tag);
        rest = remaining;
    }

    Ok(tags)
}

/// Split a `default=` component into its literal and the remaining tag text.
fn split_default<'a>(name: &str, text: &'a str) -> Result<(String, &'a str)> {
    let Some(quote) = text.chars().next().filter(|c| *c == '\'' || *c == '"') else {
        let (value, remaining) = text.split_once(':').unwrap_or((text, ""));
        return Ok((value.to_string(), remaining));
    };

    let body = &text[1..];
    let Some(end) = body.find(quote) else {
        return Err(SecretError::parse(format!(
            "secret '{name}' has an unterminated default value"
        )));
    };

    let value = body[..end].to_string();
    let after = &body[end + 1..];
    if after.is_empty() {
        return Ok((value, after));
    }
    after.strip_prefix(':').map_or_else(
        || {
            Err(SecretError::UnknownTag {
                name: name.to_string(),
                tag: after.to_string(),
            })
        },
        |remaining| Ok((value, remaining)),
    )
}
