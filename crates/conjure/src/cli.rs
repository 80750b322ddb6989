//! Command-line interface: argument parsing and dispatch
//!
//! [`Cli`] is turned into an [`ActionConfig`] once, up front; [`execute`]
//! then either lists provider versions or runs the command.

use crate::action::{
    ActionConfig, ManifestSource, provider_version_report, return_status_of, run_action,
};
use crate::tracing::{LogLevel, TracingFormat};
use crate::{Error, Result};
use clap::Parser;
use conjure_secrets::{DEFAULT_MANIFEST, IgnorePolicy, parse_definition};
use miette::Report;
use std::io::{self, Write};
use std::path::PathBuf;

/// Exit code for failures inside conjure itself, as opposed to the child's status
pub const EXIT_INTERNAL: i32 = 127;

/// Run a command with secrets injected into its environment.
///
/// Secrets are declared in a YAML manifest and resolved by a provider
/// executable, one invocation per secret.
#[derive(Parser, Debug)]
#[command(name = "conjure")]
#[command(about = "Run a command with secrets from a provider injected into its environment")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// Provider name or path (overrides CONJURE_PROVIDER)
    #[arg(short = 'p', long, value_name = "NAME|PATH")]
    pub provider: Option<String>,

    /// Path to the secrets manifest
    #[arg(short = 'f', long, value_name = "PATH", default_value = DEFAULT_MANIFEST, conflicts_with = "yaml")]
    pub file: PathBuf,

    /// Inline manifest instead of a file
    #[arg(long, value_name = "TEXT")]
    pub yaml: Option<String>,

    /// Search for the manifest in the current directory and its parents
    #[arg(long)]
    pub up: bool,

    /// Value for a %placeholder% in secret paths (repeatable)
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_definition)]
    pub defines: Vec<(String, String)>,

    /// Manifest section to apply on top of `common`
    #[arg(short = 'e', long, value_name = "NAME")]
    pub environment: Option<String>,

    /// Tolerate provider failures for this secret path (repeatable)
    #[arg(long = "ignore", value_name = "PATH")]
    pub ignore: Vec<String>,

    /// Tolerate every provider failure
    #[arg(long)]
    pub ignore_all: bool,

    /// Print the version of every installed provider and exit
    #[arg(long)]
    pub all_provider_versions: bool,

    /// Logging verbosity level
    #[arg(short = 'L', long, default_value = "warn", value_enum)]
    pub level: LogLevel,

    /// Log output format
    #[arg(long, default_value = "compact", value_enum)]
    pub log_format: TracingFormat,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "all_provider_versions"
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Snapshot the parsed flags into an [`ActionConfig`]
    #[must_use]
    pub fn into_action_config(self) -> ActionConfig {
        let mut config = ActionConfig::new(self.command);

        config.manifest = match self.yaml {
            Some(text) => ManifestSource::Inline(text),
            None => ManifestSource::File {
                path: self.file,
                search_up: self.up,
            },
        };
        config.substitutions = self.defines.into_iter().collect();
        config.provider = self.provider;
        config.environment = self.environment;
        config.ignore = if self.ignore_all {
            IgnorePolicy::all()
        } else {
            IgnorePolicy::paths(self.ignore)
        };
        config
    }
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Carry out what the command line asks for and return the exit status.
///
/// # Errors
///
/// Any failure of conjure itself. The child's own failure is an exit status.
pub async fn execute(cli: Cli) -> Result<i32> {
    let list_versions = cli.all_provider_versions;
    let config = cli.into_action_config();

    if list_versions {
        let report = provider_version_report(&config.providers).await?;
        write_stdout(&report)?;
        return Ok(0);
    }

    return_status_of(run_action(&config).await)
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| Error::configuration(format!("failed to write to stdout: {e}")))
}

/// Print `err` on stderr with miette's formatting
pub fn render_error(err: Error) {
    let report = Report::new(err);
    #[allow(clippy::print_stderr)]
    {
        eprintln!("{report:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_from(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("conjure").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_is_trailing() {
        let cli = parse_from(&["-p", "keyring", "env", "-0", "--flag"]);
        assert_eq!(cli.provider.as_deref(), Some("keyring"));
        assert_eq!(cli.command, vec!["env", "-0", "--flag"]);
    }

    #[test]
    fn defaults() {
        let cli = parse_from(&["true"]);
        assert_eq!(cli.file, PathBuf::from("secrets.yml"));
        assert!(!cli.up);
        assert_eq!(cli.level, LogLevel::Warn);

        let config = cli.into_action_config();
        assert_eq!(config.manifest, ManifestSource::default());
        assert_eq!(config.ignore, IgnorePolicy::none());
    }

    #[test]
    fn defines_become_substitutions() {
        let config = parse_from(&["-D", "env=prod", "--define", "region=eu=west", "true"])
            .into_action_config();
        assert_eq!(config.substitutions.get("env"), Some("prod"));
        assert_eq!(config.substitutions.get("region"), Some("eu=west"));
    }

    #[test]
    fn malformed_define_is_rejected() {
        let result = Cli::try_parse_from(["conjure", "-D", "novalue", "true"]);
        assert!(result.is_err());
    }

    #[test]
    fn yaml_conflicts_with_file() {
        let result = Cli::try_parse_from(["conjure", "-f", "a.yml", "--yaml", "A: b", "true"]);
        assert!(result.is_err());
    }

    #[test]
    fn inline_yaml_and_upward_search() {
        let config = parse_from(&["--yaml", "A: b", "true"]).into_action_config();
        assert_eq!(config.manifest, ManifestSource::Inline("A: b".to_string()));

        let config = parse_from(&["--up", "-f", "conf.yml", "true"]).into_action_config();
        assert_eq!(
            config.manifest,
            ManifestSource::File {
                path: PathBuf::from("conf.yml"),
                search_up: true
            }
        );
    }

    #[test]
    fn ignore_flags() {
        let config = parse_from(&["--ignore", "a/b", "--ignore", "c", "true"]).into_action_config();
        assert_eq!(config.ignore, IgnorePolicy::paths(["a/b", "c"]));

        let config = parse_from(&["--ignore-all", "true"]).into_action_config();
        assert!(config.ignore.ignores("anything"));
    }

    #[test]
    fn command_required_unless_listing_versions() {
        assert!(Cli::try_parse_from(["conjure"]).is_err());
        let cli = parse_from(&["--all-provider-versions"]);
        assert!(cli.all_provider_versions);
        assert!(cli.command.is_empty());
    }

    #[test]
    fn environment_and_level() {
        let cli = parse_from(&["-e", "production", "-L", "debug", "true"]);
        assert_eq!(cli.environment.as_deref(), Some("production"));
        assert_eq!(cli.level, LogLevel::Debug);
    }
}
