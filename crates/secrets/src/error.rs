//! Error types for the conjure-secrets crate

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for secret resolution
#[derive(Error, Debug, Diagnostic)]
pub enum SecretError {
    /// The manifest was not found in the starting directory or any ancestor
    #[error("unable to locate file specified ({filename}): reached root of file system")]
    #[diagnostic(
        code(conjure_secrets::manifest::not_found),
        help("Create the file or pass an explicit path with --file")
    )]
    ManifestNotFound {
        /// The filename that was searched for
        filename: String,
    },

    /// An absolute filename was given to the upward search
    #[error("file specified ({path}) is an absolute path: will not recurse up")]
    #[diagnostic(code(conjure_secrets::manifest::absolute_path))]
    AbsolutePathRejected {
        /// The rejected path
        path: String,
    },

    /// Unexpected filesystem failure while probing for the manifest
    #[error("unable to locate file specified ({filename}): {source}")]
    #[diagnostic(code(conjure_secrets::manifest::lookup))]
    ManifestLookup {
        /// The filename that was searched for
        filename: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The manifest text could not be parsed
    #[error("failed to parse secrets manifest: {message}")]
    #[diagnostic(code(conjure_secrets::manifest::parse))]
    ManifestParse {
        /// Description of the parse failure
        message: String,
    },

    /// A manifest entry used a tag this tool does not understand
    #[error("secret '{name}' uses unknown tag '{tag}'")]
    #[diagnostic(
        code(conjure_secrets::manifest::unknown_tag),
        help("Supported tags are !var, !file, !str and !default='...', joined with ':'")
    )]
    UnknownTag {
        /// Secret name
        name: String,
        /// The offending tag component
        tag: String,
    },

    /// A `%placeholder%` had no value in the substitution map
    #[error("secret '{name}' references undefined substitution '%{placeholder}%'")]
    #[diagnostic(
        code(conjure_secrets::substitution::unresolved),
        help("Define each placeholder with -D KEY=VALUE")
    )]
    SubstitutionUnresolved {
        /// Secret name
        name: String,
        /// Placeholder key that could not be resolved
        placeholder: String,
    },

    /// No provider could be selected
    #[error("no provider available ({step}): {message}")]
    #[diagnostic(
        code(conjure_secrets::provider::not_found),
        help("Pass --provider or set CONJURE_PROVIDER")
    )]
    ProviderNotFound {
        /// Which resolution step failed
        step: ProviderSource,
        /// Details about the failure
        message: String,
    },

    /// The provider ran but exited unsuccessfully
    #[error("provider '{provider}' failed for secret '{name}' ({}): {stderr}", exit_description(.code))]
    #[diagnostic(code(conjure_secrets::provider::invocation))]
    ProviderInvocation {
        /// Secret name
        name: String,
        /// Provider executable
        provider: String,
        /// Exit code, `None` when the provider was killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The provider executable could not be started
    #[error("failed to run provider '{provider}' for secret '{name}': {source}")]
    #[diagnostic(code(conjure_secrets::provider::launch))]
    ProviderLaunch {
        /// Secret name
        name: String,
        /// Provider executable
        provider: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Creating or writing a temporary secret file failed
    #[error("failed to write temporary file for secret '{name}': {source}")]
    #[diagnostic(code(conjure_secrets::tempfile::io))]
    TempFileIo {
        /// Secret name the file belongs to
        name: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A secret value cannot be expressed as an environment variable here
    #[error("secret '{name}' is not valid UTF-8 and cannot be set as an environment variable")]
    #[diagnostic(
        code(conjure_secrets::environment::non_unicode),
        help("Tag the secret with !file to receive the raw bytes through a file")
    )]
    NonUnicodeValue {
        /// Secret name
        name: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(conjure_secrets::io::error))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<std::path::Path>>,
        /// Description of the operation that failed
        operation: String,
    },
}

/// The provider resolution step that produced (or failed to produce) a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSource {
    /// Passed explicitly by the caller
    Explicit,
    /// Taken from the provider environment variable
    Environment,
    /// Discovered by scanning the provider directory
    Directory,
}

impl std::fmt::Display for ProviderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Explicit => "explicit provider",
            Self::Environment => "provider environment variable",
            Self::Directory => "provider directory",
        };
        f.write_str(s)
    }
}

impl SecretError {
    /// Create a manifest parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ManifestParse {
            message: message.into(),
        }
    }

    /// Create a provider-not-found error for the given step
    pub fn provider_not_found(step: ProviderSource, message: impl Into<String>) -> Self {
        Self::ProviderNotFound {
            step,
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.into_boxed_path()),
            operation: operation.into(),
        }
    }
}

fn exit_description(code: &Option<i32>) -> String {
    code.map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exit code {code}"),
    )
}

/// Result type for conjure-secrets operations
pub type Result<T> = std::result::Result<T, SecretError>;
