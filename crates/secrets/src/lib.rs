//! Secret resolution for conjure
//!
//! Turns a secrets manifest into an environment for a child process:
//!
//! 1. [`find_in_parent_tree`] locates the manifest when asked to search upward
//! 2. [`parse_manifest`] turns it into [`SecretSpec`] declarations
//! 3. [`Substitutions`] expands `%placeholder%` tokens in locator paths
//! 4. [`ProviderResolver`] picks the provider executable and [`ExecProvider`]
//!    runs it once per secret ([`resolve_secrets`])
//! 5. [`Environment::with_secrets`] materializes values, writing file-tagged
//!    secrets through a [`TempFileFactory`]
//!
//! ```ignore
//! use conjure_secrets::*;
//!
//! let specs = parse_manifest(&text, None)?;
//! let provider = ExecProvider::new(ProviderResolver::from_env().resolve(None)?);
//! let resolved = resolve_secrets(&specs, Some(&provider), &subs, &IgnorePolicy::none()).await?;
//!
//! let mut temp_files = TempFileFactory::new();
//! let env = Environment::inherited().with_secrets(&resolved, &mut temp_files)?;
//! // temp files are removed when `temp_files` is cleaned up or dropped
//! ```

mod environment;
mod error;
mod locate;
mod manifest;
pub mod provider;
mod resolved;
pub mod resolvers;
mod spec;
mod substitution;
mod tempfiles;
mod types;

pub use environment::{Environment, materialize, secret_pairs};
pub use error::{ProviderSource, Result, SecretError};
pub use locate::find_in_parent_tree;
pub use manifest::{COMMON_SECTION, DEFAULT_MANIFEST, parse_manifest};
pub use provider::{ProviderResolver, provider_versions};
pub use resolved::{IgnorePolicy, resolve_secrets};
pub use resolvers::ExecProvider;
pub use spec::{SecretSpec, SecretTag, parse_tags};
pub use substitution::{Substitutions, parse_definition};
pub use tempfiles::{TempFileEntry, TempFileFactory};
pub use types::{ResolvedSecret, SecureSecret};

use async_trait::async_trait;

/// Capability contract for anything that can turn a locator into a secret.
///
/// Implementors must provide:
/// - [`resolve`](SecretResolver::resolve) - single secret resolution
/// - [`provider_name`](SecretResolver::provider_name) - identifier for logs
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Resolve the secret at `spec.path` to its raw bytes.
    async fn resolve(&self, spec: &SecretSpec) -> Result<Vec<u8>>;

    /// Get the provider name for this resolver.
    fn provider_name(&self) -> &str;

    /// Resolve a single secret returning a secure value.
    ///
    /// The returned [`SecureSecret`] will automatically zero its memory on drop.
    async fn resolve_secure(&self, spec: &SecretSpec) -> Result<SecureSecret> {
        let value = self.resolve(spec).await?;
        Ok(SecureSecret::new(value))
    }
}
