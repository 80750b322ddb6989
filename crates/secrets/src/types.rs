//! Secure secret types with automatic memory zeroing
//!
//! - [`SecureSecret`]: a wrapper around `secrecy::SecretSlice<u8>` that auto-zeros on drop
//! - [`ResolvedSecret`]: one secret after resolution, ready for materialization

use secrecy::{ExposeSecret, SecretSlice};

/// A resolved secret value with automatic memory zeroing on drop.
///
/// The value is raw bytes: provider output is kept exactly as printed, so
/// binary material such as DER certificates survives unchanged.
///
/// Debug and Display output show `[REDACTED]`; the value is only reachable
/// through an explicit [`expose`](SecureSecret::expose) call.
#[derive(Clone)]
pub struct SecureSecret {
    inner: SecretSlice<u8>,
}

impl SecureSecret {
    /// Create a new secure secret from bytes or a string.
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: SecretSlice::from(value.into()),
        }
    }

    /// Expose the secret value for use.
    ///
    /// The caller must not log or persist the exposed value.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Get the length of the secret value without exposing it.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Check if the secret value is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for SecureSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SecureSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// A secret after provider lookup or literal evaluation.
///
/// Produced once per resolution pass and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedSecret {
    name: String,
    value: SecureSecret,
    is_file: bool,
}

impl ResolvedSecret {
    /// Create a resolved secret
    #[must_use]
    pub fn new(name: impl Into<String>, value: SecureSecret, is_file: bool) -> Self {
        Self {
            name: name.into(),
            value,
            is_file,
        }
    }

    /// The environment variable name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The secret value
    #[must_use]
    pub fn value(&self) -> &SecureSecret {
        &self.value
    }

    /// Whether the secret is exposed through a temporary file
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.is_file
    }
}
