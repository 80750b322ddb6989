//! Sequential resolution of manifest declarations

use crate::error::ProviderSource;
use crate::{
    ResolvedSecret, Result, SecretError, SecretResolver, SecretSpec, SecureSecret, Substitutions,
};
use std::collections::BTreeSet;

/// Which provider failures are tolerated during resolution.
///
/// An ignored secret is logged and left out of the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnorePolicy {
    all: bool,
    paths: BTreeSet<String>,
}

impl IgnorePolicy {
    /// Tolerate no failures
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Tolerate every provider failure
    #[must_use]
    pub fn all() -> Self {
        Self {
            all: true,
            paths: BTreeSet::new(),
        }
    }

    /// Tolerate failures for the given locator paths
    #[must_use]
    pub fn paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all: false,
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a failure for `path` should be tolerated
    #[must_use]
    pub fn ignores(&self, path: &str) -> bool {
        self.all || self.paths.contains(path)
    }
}

/// Resolve every declaration, one at a time, in manifest order.
///
/// Placeholders are expanded first. `Var` secrets go through `provider`, one
/// invocation fully completing before the next starts; literal secrets use
/// their explicit value, falling back to the default. When a provider call
/// fails, a declared default is used instead, then the ignore policy is
/// consulted.
///
/// # Errors
///
/// Returns the first substitution or provider error that is not covered by a
/// default or the ignore policy. A `Var` secret with no `provider` yields
/// [`SecretError::ProviderNotFound`].
pub async fn resolve_secrets(
    specs: &[SecretSpec],
    provider: Option<&dyn SecretResolver>,
    substitutions: &Substitutions,
    ignore: &IgnorePolicy,
) -> Result<Vec<ResolvedSecret>> {
    let mut resolved = Vec::with_capacity(specs.len());

    for declared in specs {
        let spec = substitutions.apply(declared)?;

        let value = if spec.is_var() {
            let provider = provider.ok_or_else(|| {
                SecretError::provider_not_found(
                    ProviderSource::Explicit,
                    format!("secret '{}' requires a provider", spec.name),
                )
            })?;

            match provider.resolve_secure(&spec).await {
                Ok(value) => {
                    if value.is_empty() {
                        tracing::warn!(
                            secret = %spec.name,
                            provider = %provider.provider_name(),
                            "Provider returned an empty value"
                        );
                    }
                    value
                }
                Err(e) => {
                    if let Some(default) = spec.default_value() {
                        tracing::warn!(
                            secret = %spec.name,
                            error = %e,
                            "Provider failed, using declared default"
                        );
                        SecureSecret::new(default)
                    } else if ignore.ignores(&spec.path) {
                        tracing::warn!(
                            secret = %spec.name,
                            path = %spec.path,
                            error = %e,
                            "Ignoring provider failure"
                        );
                        continue;
                    } else {
                        return Err(e);
                    }
                }
            }
        } else {
            SecureSecret::new(spec.literal_value())
        };

        let is_file = spec.is_file();
        tracing::debug!(
            secret = %spec.name,
            len = value.len(),
            file = is_file,
            "Resolved secret"
        );
        resolved.push(ResolvedSecret::new(spec.name, value, is_file));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecretTag;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Provider double recording every locator it was asked for
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<String>>,
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl SecretResolver for RecordingProvider {
        fn provider_name(&self) -> &str {
            "recording"
        }

        async fn resolve(&self, spec: &SecretSpec) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(spec.path.clone());
            if self.failing.contains(&spec.path.as_str()) {
                return Err(SecretError::ProviderInvocation {
                    name: spec.name.clone(),
                    provider: "recording".to_string(),
                    code: Some(1),
                    stderr: "missing".to_string(),
                });
            }
            Ok(format!("secret:{}", spec.path).into_bytes())
        }
    }

    fn values(resolved: &[ResolvedSecret]) -> Vec<(&str, &str)> {
        resolved
            .iter()
            .map(|s| (s.name(), std::str::from_utf8(s.value().expose()).unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn resolves_in_manifest_order() {
        let provider = RecordingProvider::default();
        let specs = vec![
            SecretSpec::var("B", "path/b"),
            SecretSpec::literal("LIT", "plain"),
            SecretSpec::var("A", "path/a"),
        ];

        let resolved = resolve_secrets(
            &specs,
            Some(&provider),
            &Substitutions::new(),
            &IgnorePolicy::none(),
        )
        .await
        .unwrap();

        assert_eq!(
            values(&resolved),
            vec![
                ("B", "secret:path/b"),
                ("LIT", "plain"),
                ("A", "secret:path/a")
            ]
        );
        assert_eq!(*provider.calls.lock().unwrap(), vec!["path/b", "path/a"]);
    }

    #[tokio::test]
    async fn substitutions_apply_before_invocation() {
        let provider = RecordingProvider::default();
        let subs: Substitutions = [("env", "prod")].into_iter().collect();
        let specs = vec![SecretSpec::var("DB", "%env%/db")];

        resolve_secrets(&specs, Some(&provider), &subs, &IgnorePolicy::none())
            .await
            .unwrap();

        assert_eq!(*provider.calls.lock().unwrap(), vec!["prod/db"]);
    }

    #[tokio::test]
    async fn unresolved_substitution_stops_before_provider() {
        let provider = RecordingProvider::default();
        let specs = vec![SecretSpec::var("DB", "%env%/db")];

        let err = resolve_secrets(
            &specs,
            Some(&provider),
            &Substitutions::new(),
            &IgnorePolicy::none(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SecretError::SubstitutionUnresolved { .. }));
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let provider = RecordingProvider {
            failing: vec!["path/a"],
            ..Default::default()
        };
        let specs = vec![SecretSpec::var("A", "path/a")];

        let err = resolve_secrets(
            &specs,
            Some(&provider),
            &Substitutions::new(),
            &IgnorePolicy::none(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SecretError::ProviderInvocation { .. }));
    }

    #[tokio::test]
    async fn default_covers_provider_failure() {
        let provider = RecordingProvider {
            failing: vec!["path/a"],
            ..Default::default()
        };
        let specs = vec![
            SecretSpec::var("A", "path/a").with_tag(SecretTag::Default("fallback".to_string())),
        ];

        let resolved = resolve_secrets(
            &specs,
            Some(&provider),
            &Substitutions::new(),
            &IgnorePolicy::none(),
        )
        .await
        .unwrap();
        assert_eq!(values(&resolved), vec![("A", "fallback")]);
    }

    #[tokio::test]
    async fn ignored_paths_are_skipped() {
        let provider = RecordingProvider {
            failing: vec!["path/a"],
            ..Default::default()
        };
        let specs = vec![
            SecretSpec::var("A", "path/a"),
            SecretSpec::var("B", "path/b"),
        ];

        let resolved = resolve_secrets(
            &specs,
            Some(&provider),
            &Substitutions::new(),
            &IgnorePolicy::paths(["path/a"]),
        )
        .await
        .unwrap();
        assert_eq!(values(&resolved), vec![("B", "secret:path/b")]);
    }

    #[tokio::test]
    async fn literal_default_and_file_flag() {
        let specs = vec![
            SecretSpec::literal("FOO", "")
                .with_tag(SecretTag::Default("defaultValueOfVariable".to_string())),
            SecretSpec::literal("CERT", "pem-body").with_tag(SecretTag::File),
        ];

        let resolved =
            resolve_secrets(&specs, None, &Substitutions::new(), &IgnorePolicy::none())
                .await
                .unwrap();

        assert_eq!(
            values(&resolved),
            vec![("FOO", "defaultValueOfVariable"), ("CERT", "pem-body")]
        );
        assert!(resolved[1].is_file());
    }

    #[tokio::test]
    async fn var_without_provider_is_an_error() {
        let specs = vec![SecretSpec::var("A", "path/a")];
        let err = resolve_secrets(&specs, None, &Substitutions::new(), &IgnorePolicy::all())
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::ProviderNotFound { .. }));
    }

    #[test]
    fn ignore_policy_matching() {
        assert!(IgnorePolicy::all().ignores("anything"));
        assert!(!IgnorePolicy::none().ignores("anything"));
        let policy = IgnorePolicy::paths(["a/b"]);
        assert!(policy.ignores("a/b"));
        assert!(!policy.ignores("a/c"));
    }
}
