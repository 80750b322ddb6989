//! Environment assembly for the child process
//!
//! The inherited environment is read once into an [`Environment`] snapshot;
//! secrets are layered on top by producing a new snapshot, never by touching
//! the process environment. Names and values are kept as OS strings so
//! variables that are not valid Unicode pass through untouched.

use crate::{ResolvedSecret, Result, TempFileFactory};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;

/// An ordered, de-duplicated set of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<OsString, OsString>,
}

impl Environment {
    /// Create an empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    #[must_use]
    pub fn inherited() -> Self {
        std::env::vars_os().collect()
    }

    /// Get a variable's value
    #[must_use]
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Return a new environment where every pair in `overrides` replaces
    /// the variable of the same name.
    #[must_use]
    pub fn overlay<I, K, V>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut vars = self.vars.clone();
        vars.extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self { vars }
    }

    /// Return a new environment with the resolved secrets applied on top.
    ///
    /// `Var` secrets contribute their value; `File` secrets contribute the
    /// path of a temporary file created through `temp_files`. A secret always
    /// wins over an inherited variable of the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if a temporary file cannot be written.
    pub fn with_secrets(
        &self,
        secrets: &[ResolvedSecret],
        temp_files: &mut TempFileFactory,
    ) -> Result<Self> {
        let pairs = secret_pairs(secrets, temp_files)?;
        Ok(self.overlay(pairs))
    }

    /// `KEY=VALUE` lines in key order, each newline-terminated, with names
    /// and values written as their raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.vars {
            out.extend_from_slice(key.as_encoded_bytes());
            out.push(b'=');
            out.extend_from_slice(value.as_encoded_bytes());
            out.push(b'\n');
        }
        out
    }
}

/// Materialize each resolved secret as a `(name, value)` environment pair.
///
/// # Errors
///
/// Returns an error if a temporary file cannot be written.
pub fn secret_pairs(
    secrets: &[ResolvedSecret],
    temp_files: &mut TempFileFactory,
) -> Result<Vec<(String, OsString)>> {
    secrets
        .iter()
        .map(|secret| materialize(secret, temp_files))
        .collect()
}

/// Materialize one secret: its value, or the path of a file containing it.
///
/// File secrets are written byte for byte.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written, or if a `Var`
/// value cannot be represented as an environment value on this platform.
pub fn materialize(
    secret: &ResolvedSecret,
    temp_files: &mut TempFileFactory,
) -> Result<(String, OsString)> {
    let value = if secret.is_file() {
        temp_files
            .push(secret.name(), secret.value().expose())?
            .into_os_string()
    } else {
        env_value(secret.name(), secret.value().expose())?
    };
    Ok((secret.name().to_string(), value))
}

#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
fn env_value(_name: &str, bytes: &[u8]) -> Result<OsString> {
    use std::os::unix::ffi::OsStringExt;
    Ok(OsString::from_vec(bytes.to_vec()))
}

#[cfg(not(unix))]
fn env_value(name: &str, bytes: &[u8]) -> Result<OsString> {
    String::from_utf8(bytes.to_vec())
        .map(OsString::from)
        .map_err(|_| crate::SecretError::NonUnicodeValue {
            name: name.to_string(),
        })
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// `KEY=VALUE` lines in key order, with non-Unicode data replaced.
impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.vars {
            writeln!(f, "{}={}", key.to_string_lossy(), value.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecureSecret;
    use tempfile::TempDir;

    fn secret(name: &str, value: &str, is_file: bool) -> ResolvedSecret {
        ResolvedSecret::new(name, SecureSecret::new(value), is_file)
    }

    #[test]
    fn display_is_sorted_with_trailing_newline() {
        let env: Environment = [("foo", "bar"), ("baz", "qux")].into_iter().collect();
        assert_eq!(env.to_string(), "baz=qux\nfoo=bar\n");
        assert_eq!(env.to_bytes(), b"baz=qux\nfoo=bar\n");
    }

    #[test]
    fn empty_environment_displays_nothing() {
        assert_eq!(Environment::new().to_string(), "");
        assert!(Environment::new().to_bytes().is_empty());
    }

    #[test]
    fn var_secret_pair_is_the_value() {
        let mut factory = TempFileFactory::new();
        let pair = materialize(&secret("dbpass", "mysecretvalue", false), &mut factory).unwrap();
        assert_eq!(pair, ("dbpass".to_string(), OsString::from("mysecretvalue")));
        assert!(factory.is_empty());
    }

    #[test]
    fn file_secret_pair_is_a_path_to_the_value() {
        let dir = TempDir::new().unwrap();
        let mut factory = TempFileFactory::in_dir(dir.path());

        let (key, path) =
            materialize(&secret("SSL_CERT", "mysecretvalue", true), &mut factory).unwrap();

        assert_eq!(key, "SSL_CERT");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "mysecretvalue");

        factory.cleanup();
        assert!(!std::path::Path::new(&path).exists());
    }

    #[test]
    fn binary_file_secret_is_written_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut factory = TempFileFactory::in_dir(dir.path());
        let der = ResolvedSecret::new("CERT", SecureSecret::new(vec![0xff_u8, 0xfe, 0x01]), true);

        let (_, path) = materialize(&der, &mut factory).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0xff_u8, 0xfe, 0x01]);
    }

    #[cfg(unix)]
    #[test]
    fn binary_var_secret_keeps_its_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let mut factory = TempFileFactory::new();
        let raw = ResolvedSecret::new("RAW", SecureSecret::new(vec![b'a', 0xe9]), false);

        let (_, value) = materialize(&raw, &mut factory).unwrap();

        assert_eq!(value.as_bytes(), [b'a', 0xe9]);
    }

    #[test]
    fn secrets_override_inherited_variables() {
        let dir = TempDir::new().unwrap();
        let mut factory = TempFileFactory::in_dir(dir.path());
        let inherited: Environment = [("PATH", "/usr/bin"), ("TOKEN", "old")].into_iter().collect();

        let env = inherited
            .with_secrets(
                &[secret("TOKEN", "new", false), secret("KEY", "k", false)],
                &mut factory,
            )
            .unwrap();

        assert_eq!(env.get("TOKEN"), Some(OsStr::new("new")));
        assert_eq!(env.get("KEY"), Some(OsStr::new("k")));
        assert_eq!(env.get("PATH"), Some(OsStr::new("/usr/bin")));
        assert_eq!(env.len(), 3);
        // The snapshot the overlay started from is unchanged
        assert_eq!(inherited.get("TOKEN"), Some(OsStr::new("old")));
    }

    #[test]
    fn inherited_snapshot_reads_process_environment() {
        temp_env::with_var("CONJURE_TEST_INHERITED", Some("present"), || {
            let env = Environment::inherited();
            assert_eq!(env.get("CONJURE_TEST_INHERITED"), Some(OsStr::new("present")));
        });
    }

    #[cfg(unix)]
    #[test]
    fn inherited_snapshot_keeps_non_unicode_values() {
        use std::os::unix::ffi::OsStrExt;

        let latin1 = OsStr::from_bytes(b"caf\xe9");
        temp_env::with_var("CONJURE_TEST_LATIN1", Some(latin1), || {
            let env = Environment::inherited();
            assert_eq!(env.get("CONJURE_TEST_LATIN1"), Some(latin1));
            assert!(env.to_bytes().windows(4).any(|w| w == b"caf\xe9"));
        });
    }
}
