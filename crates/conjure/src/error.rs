//! Error types for the conjure binary

use conjure_secrets::SecretError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while running an action
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Failure while resolving or materializing secrets
    #[error(transparent)]
    #[diagnostic(transparent)]
    Secrets(#[from] SecretError),

    /// The target command could not be found or started
    #[error("failed to launch '{program}': {message}")]
    #[diagnostic(
        code(conjure::subcommand::launch),
        help("Check that the command exists on PATH")
    )]
    SubcommandLaunch {
        /// Program as given on the command line
        program: String,
        /// Why the launch failed
        message: String,
    },

    /// Waiting on the running child failed for a reason other than its exit
    #[error("failed waiting for '{program}': {source}")]
    #[diagnostic(code(conjure::subcommand::wait))]
    SubcommandWait {
        /// Program as given on the command line
        program: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid combination of inputs
    #[error("configuration error: {message}")]
    #[diagnostic(code(conjure::config))]
    Configuration {
        /// What is wrong
        message: String,
        /// Optional hint
        #[help]
        help: Option<String>,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with a hint
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a launch error
    #[must_use]
    pub fn launch(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SubcommandLaunch {
            program: program.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for conjure operations
pub type Result<T> = std::result::Result<T, Error>;
