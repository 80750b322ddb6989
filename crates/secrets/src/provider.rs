//! Provider selection and metadata
//!
//! A provider is any executable that accepts a secret locator as its only
//! argument and prints the secret on stdout. Selection follows a fixed
//! priority: explicit choice, then [`PROVIDER_ENV`], then the single
//! executable installed in the provider directory.

use crate::error::ProviderSource;
use crate::{Result, SecretError};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Environment variable naming the provider to use
pub const PROVIDER_ENV: &str = "CONJURE_PROVIDER";

/// Environment variable overriding the provider directory
pub const PROVIDER_PATH_ENV: &str = "CONJURE_PROVIDER_PATH";

/// Directory scanned for providers when nothing else is configured
#[cfg(unix)]
pub const DEFAULT_PROVIDER_DIR: &str = "/usr/local/lib/conjure";

/// Directory scanned for providers when nothing else is configured
#[cfg(windows)]
pub const DEFAULT_PROVIDER_DIR: &str = r"C:\Program Files\conjure\providers";

/// Picks the provider executable for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResolver {
    directory: PathBuf,
    env_value: Option<String>,
}

impl ProviderResolver {
    /// Create a resolver scanning `directory`, with no environment selection
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            env_value: None,
        }
    }

    /// Create a resolver from [`PROVIDER_PATH_ENV`] and [`PROVIDER_ENV`]
    #[must_use]
    pub fn from_env() -> Self {
        let directory = std::env::var_os(PROVIDER_PATH_ENV)
            .filter(|dir| !dir.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_PROVIDER_DIR), PathBuf::from);
        Self {
            directory,
            env_value: std::env::var(PROVIDER_ENV).ok(),
        }
    }

    /// Set the value that would have come from [`PROVIDER_ENV`]
    #[must_use]
    pub fn with_env_value(mut self, value: Option<String>) -> Self {
        self.env_value = value;
        self
    }

    /// The directory scanned for providers
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Resolve the provider executable.
    ///
    /// Bare names are looked up inside the provider directory; anything with a
    /// path separator is used as given.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::ProviderNotFound`] naming the step that failed:
    /// the selected provider does not exist, or the directory holds zero or
    /// several candidates.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<PathBuf> {
        if let Some(name) = explicit.filter(|name| !name.is_empty()) {
            return self.expand(ProviderSource::Explicit, name);
        }

        if let Some(name) = self.env_value.as_deref().filter(|name| !name.is_empty()) {
            return self.expand(ProviderSource::Environment, name);
        }

        let candidates = list_providers(&self.directory).map_err(|e| {
            SecretError::provider_not_found(
                ProviderSource::Directory,
                format!("cannot read {}: {e}", self.directory.display()),
            )
        })?;

        match candidates.as_slice() {
            [single] => Ok(single.clone()),
            [] => Err(SecretError::provider_not_found(
                ProviderSource::Directory,
                format!("no providers found in {}", self.directory.display()),
            )),
            many => Err(SecretError::provider_not_found(
                ProviderSource::Directory,
                format!(
                    "more than one provider found in {} ({}), select one explicitly",
                    self.directory.display(),
                    many.iter()
                        .filter_map(|p| p.file_name())
                        .map(|n| n.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    fn expand(&self, step: ProviderSource, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        let path = if candidate.components().count() > 1 || candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.directory.join(candidate)
        };

        if path.is_file() {
            tracing::debug!(provider = %path.display(), source = %step, "Resolved provider");
            Ok(path)
        } else {
            Err(SecretError::provider_not_found(
                step,
                format!("{} does not exist", path.display()),
            ))
        }
    }
}

/// List the provider executables in `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`SecretError::Io`] when the directory cannot be read.
pub fn list_providers(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| SecretError::io(e, Some(dir.to_path_buf()), "read provider directory"))?;

    let mut providers: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .collect();
    providers.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(providers)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Ask a provider for its version with `--version`.
///
/// Returns `None` when the provider cannot run, exits unsuccessfully, or
/// prints nothing.
pub async fn provider_version(provider: &Path) -> Option<String> {
    let output = Command::new(provider).arg("--version").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    (!version.trim().is_empty()).then_some(version)
}

/// Report the version of every provider in `dir`, one per line, in name order.
///
/// Providers whose version query fails are listed as `unknown version`
/// rather than aborting the listing.
///
/// # Errors
///
/// Returns [`SecretError::Io`] when the directory cannot be read.
pub async fn provider_versions(dir: &Path) -> Result<String> {
    let mut report = format!("Provider versions in {}:\n", dir.display());

    for provider in list_providers(dir)? {
        let name = provider
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match provider_version(&provider).await {
            Some(version) => report.push_str(&format!("{name} version {version}\n")),
            None => report.push_str(&format!("{name}: unknown version\n")),
        }
    }

    Ok(report)
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script named `name` into `dir`
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
