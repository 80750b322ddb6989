//! Provider executable secret resolver

use crate::{Result, SecretError, SecretResolver, SecretSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Resolves secrets by running a provider executable.
///
/// The provider receives the secret locator as its only argument. Its stdout,
/// minus one trailing newline, is the secret value; a nonzero exit is a
/// failure and its stderr is kept for diagnostics.
#[derive(Debug, Clone)]
pub struct ExecProvider {
    executable: PathBuf,
    display_name: String,
}

impl ExecProvider {
    /// Create a resolver for the given provider executable
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        let display_name = executable
            .file_name()
            .map_or_else(|| executable.display().to_string(), |n| {
                n.to_string_lossy().into_owned()
            });
        Self {
            executable,
            display_name,
        }
    }

    /// The provider executable path
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run the provider for one locator and return its output
    async fn execute(&self, name: &str, locator: &str) -> Result<Vec<u8>> {
        tracing::debug!(
            secret = %name,
            provider = %self.executable.display(),
            "Invoking provider"
        );

        let output = Command::new(&self.executable)
            .arg(locator)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SecretError::ProviderLaunch {
                name: name.to_string(),
                provider: self.executable.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SecretError::ProviderInvocation {
                name: name.to_string(),
                provider: self.executable.display().to_string(),
                code: output.status.code(),
                stderr: stderr.trim_end().to_string(),
            });
        }

        let mut stdout = output.stdout;
        strip_trailing_newline(&mut stdout);
        Ok(stdout)
    }
}

fn strip_trailing_newline(value: &mut Vec<u8>) {
    if value.last() == Some(&b'\n') {
        value.pop();
        if value.last() == Some(&b'\r') {
            value.pop();
        }
    }
}

#[async_trait]
impl SecretResolver for ExecProvider {
    fn provider_name(&self) -> &str {
        &self.display_name
    }

    async fn resolve(&self, spec: &SecretSpec) -> Result<Vec<u8>> {
        self.execute(&spec.name, &spec.path).await
    }
}
