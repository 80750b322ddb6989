//! Secrets manifest parsing
//!
//! A manifest is a YAML mapping from variable names to declarations:
//!
//! ```yaml
//! DB_PASSWORD: !var prod/db/password
//! TLS_CERT: !var:file prod/tls/cert
//! REGION: us-east-1
//! GREETING: !str:default='hello'
//! ```
//!
//! With an environment selected, the top level is instead a mapping of
//! sections; the `common` section (if any) is applied first and the selected
//! section overrides it.

use crate::spec::parse_tags;
use crate::{Result, SecretError, SecretSpec};
use serde_yaml::{Mapping, Value};

/// Default manifest filename
pub const DEFAULT_MANIFEST: &str = "secrets.yml";

/// Section merged into every selected environment
pub const COMMON_SECTION: &str = "common";

/// Parse manifest text into secret declarations, in declaration order.
///
/// # Errors
///
/// Returns [`SecretError::ManifestParse`] for malformed YAML, non-string keys,
/// non-scalar values or a missing environment section, and
/// [`SecretError::UnknownTag`] for unsupported tags.
pub fn parse_manifest(text: &str, environment: Option<&str>) -> Result<Vec<SecretSpec>> {
    let document: Value =
        serde_yaml::from_str(text).map_err(|e| SecretError::parse(e.to_string()))?;

    let root = match document {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(mapping) => mapping,
        _ => return Err(SecretError::parse("manifest must be a mapping of names")),
    };

    let Some(environment) = environment else {
        return parse_entries(&root);
    };

    let mut specs = match root.get(COMMON_SECTION) {
        Some(common) => section_entries(COMMON_SECTION, common)?,
        None => Vec::new(),
    };

    let selected = root.get(environment).ok_or_else(|| {
        SecretError::parse(format!("environment '{environment}' not found in manifest"))
    })?;

    for spec in section_entries(environment, selected)? {
        match specs.iter_mut().find(|existing| existing.name == spec.name) {
            Some(existing) => *existing = spec,
            None => specs.push(spec),
        }
    }

    Ok(specs)
}

fn section_entries(name: &str, value: &Value) -> Result<Vec<SecretSpec>> {
    match value {
        Value::Mapping(mapping) => parse_entries(mapping),
        // An empty section is written as `name:` with nothing after it
        Value::Null => Ok(Vec::new()),
        _ => Err(SecretError::parse(format!(
            "environment section '{name}' must be a mapping"
        ))),
    }
}

fn parse_entries(mapping: &Mapping) -> Result<Vec<SecretSpec>> {
    mapping
        .iter()
        .map(|(key, value)| {
            let Value::String(name) = key else {
                return Err(SecretError::parse(format!(
                    "secret names must be strings, found {key:?}"
                )));
            };
            parse_entry(name, value)
        })
        .collect()
}

fn parse_entry(name: &str, value: &Value) -> Result<SecretSpec> {
    match value {
        Value::Tagged(tagged) => Ok(SecretSpec {
            name: name.to_string(),
            path: scalar_text(name, &tagged.value)?,
            tags: parse_tags(name, &tagged.tag.to_string())?,
        }),
        other => Ok(SecretSpec::literal(name, scalar_text(name, other)?)),
    }
}

fn scalar_text(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => Err(SecretError::parse(
            format!("secret '{name}' must have a scalar value"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecretTag;

    #[test]
    fn parses_literal_and_tagged_entries() {
        let text = "\
DB_PASSWORD: !var prod/db/password
TLS_CERT: !var:file prod/tls/cert
REGION: us-east-1
PORT: 5432
";
        let specs = parse_manifest(text, None).unwrap();
        assert_eq!(specs.len(), 4);

        assert_eq!(specs[0], SecretSpec::var("DB_PASSWORD", "prod/db/password"));
        assert!(specs[1].is_var() && specs[1].is_file());
        assert_eq!(specs[2], SecretSpec::literal("REGION", "us-east-1"));
        assert_eq!(specs[3].path, "5432");
    }

    #[test]
    fn default_without_literal() {
        let specs = parse_manifest("FOO: !str:default='defaultValueOfVariable'", None).unwrap();
        assert_eq!(specs[0].literal_value(), "defaultValueOfVariable");
    }

    #[test]
    fn explicit_literal_overrides_default() {
        let specs =
            parse_manifest("FOO: !str:default='something' valueOfVariable", None).unwrap();
        assert_eq!(
            specs[0].tags,
            vec![
                SecretTag::Literal,
                SecretTag::Default("something".to_string())
            ]
        );
        assert_eq!(specs[0].literal_value(), "valueOfVariable");
    }

    #[test]
    fn empty_manifest_has_no_secrets() {
        assert!(parse_manifest("", None).unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_tags() {
        let err = parse_manifest("FOO: !bogus value", None).unwrap_err();
        assert!(matches!(err, SecretError::UnknownTag { .. }));
    }

    #[test]
    fn rejects_nested_values() {
        let err = parse_manifest("FOO:\n  - a\n  - b\n", None).unwrap_err();
        assert!(err.to_string().contains("scalar"));
    }

    #[test]
    fn rejects_non_mapping_document() {
        let err = parse_manifest("- just\n- a list\n", None).unwrap_err();
        assert!(matches!(err, SecretError::ManifestParse { .. }));
    }

    #[test]
    fn environment_section_overrides_common() {
        let text = "\
common:
  REGION: us-east-1
  LOG_LEVEL: info
production:
  LOG_LEVEL: warn
  DB_PASSWORD: !var prod/db/password
staging:
  DB_PASSWORD: !var staging/db/password
";
        let specs = parse_manifest(text, Some("production")).unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["REGION", "LOG_LEVEL", "DB_PASSWORD"]);
        assert_eq!(specs[1].path, "warn");
        assert_eq!(specs[2].path, "prod/db/password");
    }

    #[test]
    fn missing_environment_is_an_error() {
        let err = parse_manifest("production:\n  A: b\n", Some("staging")).unwrap_err();
        assert!(err.to_string().contains("staging"));
    }
}
