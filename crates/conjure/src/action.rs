//! One conjure invocation: manifest in, subcommand exit status out

use crate::runner::{RunOutcome, SubcommandRunner};
use crate::{Error, Result};
use conjure_secrets::{
    DEFAULT_MANIFEST, Environment, ExecProvider, IgnorePolicy, ProviderResolver, ResolvedSecret,
    SecretError, SecretResolver, SecretSpec, Substitutions, TempFileFactory, find_in_parent_tree,
    parse_manifest, provider_versions, secret_pairs,
};
use std::path::PathBuf;
use tracing::instrument;

/// Command argument replaced by the path of a file holding the secret environment
pub const ENV_FILE_ARG: &str = "@CONJUREENVFILE";

/// Where the secrets manifest comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// Manifest text given directly
    Inline(String),
    /// Manifest read from a file
    File {
        /// Path to read, relative to the working directory
        path: PathBuf,
        /// Search the working directory and its ancestors for `path`
        search_up: bool,
    },
}

impl Default for ManifestSource {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from(DEFAULT_MANIFEST),
            search_up: false,
        }
    }
}

/// Everything one run needs, captured up front.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Target command and its arguments
    pub args: Vec<String>,
    /// Manifest to resolve
    pub manifest: ManifestSource,
    /// `%placeholder%` values
    pub substitutions: Substitutions,
    /// Provider chosen on the command line
    pub provider: Option<String>,
    /// Provider directory and environment selection
    pub providers: ProviderResolver,
    /// Manifest section to apply on top of `common`
    pub environment: Option<String>,
    /// Provider failures to tolerate
    pub ignore: IgnorePolicy,
    /// Directory relative manifest paths are resolved against
    pub working_dir: PathBuf,
    /// Directory secret files and the env file are written to
    pub temp_dir: PathBuf,
}

impl ActionConfig {
    /// Config for running `args` with defaults taken from the process environment
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            manifest: ManifestSource::default(),
            substitutions: Substitutions::new(),
            provider: None,
            providers: ProviderResolver::from_env(),
            environment: None,
            ignore: IgnorePolicy::none(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            temp_dir: TempFileFactory::default_directory(),
        }
    }
}

/// Resolve the manifest, run the command with the secrets, and clean up.
///
/// Temporary files live exactly as long as the subcommand and are removed on
/// every path out of this function.
///
/// # Errors
///
/// Any manifest, provider, temp-file or launch failure. The child exiting
/// nonzero is reported through [`RunOutcome`], not as an error.
#[instrument(skip_all, fields(command = ?config.args.first()))]
pub async fn run_action(config: &ActionConfig) -> Result<RunOutcome> {
    let text = load_manifest(config)?;
    let specs = parse_manifest(&text, config.environment.as_deref())?;
    tracing::debug!(secrets = specs.len(), "Parsed manifest");

    let provider = if specs.iter().any(SecretSpec::is_var) {
        let provider = ExecProvider::new(config.providers.resolve(config.provider.as_deref())?);
        tracing::debug!(provider = %provider.executable().display(), "Selected provider");
        Some(provider)
    } else {
        None
    };

    let resolved = conjure_secrets::resolve_secrets(
        &specs,
        provider.as_ref().map(|p| p as &dyn SecretResolver),
        &config.substitutions,
        &config.ignore,
    )
    .await?;

    let mut temp_files = TempFileFactory::in_dir(&config.temp_dir);
    let result = launch(config, &resolved, &mut temp_files).await;
    tracing::debug!(
        files = temp_files.len(),
        directory = %temp_files.directory().display(),
        "Removing secret files"
    );
    temp_files.cleanup();
    result
}

async fn launch(
    config: &ActionConfig,
    resolved: &[ResolvedSecret],
    temp_files: &mut TempFileFactory,
) -> Result<RunOutcome> {
    let pairs = secret_pairs(resolved, temp_files)?;
    let env = Environment::inherited().overlay(pairs.iter().cloned());
    let secrets: Environment = pairs.into_iter().collect();

    let args = expand_env_file_args(&config.args, &secrets, temp_files)?;
    SubcommandRunner::new().run(&args, &env).await
}

fn load_manifest(config: &ActionConfig) -> Result<String> {
    let path = match &config.manifest {
        ManifestSource::Inline(text) => return Ok(text.clone()),
        ManifestSource::File {
            path,
            search_up: false,
        } => config.working_dir.join(path),
        ManifestSource::File {
            path,
            search_up: true,
        } => {
            let filename = path.to_str().ok_or_else(|| {
                Error::configuration(format!("manifest path {} is not UTF-8", path.display()))
            })?;
            find_in_parent_tree(filename, &config.working_dir)?
        }
    };

    tracing::debug!(manifest = %path.display(), "Reading manifest");
    std::fs::read_to_string(&path)
        .map_err(|e| {
            let operation = format!("read of manifest {}", path.display());
            SecretError::io(e, Some(path.clone()), operation).into()
        })
}

/// Replace every [`ENV_FILE_ARG`] with the path of a file holding `secrets`.
///
/// The file is only created when the marker is present.
fn expand_env_file_args(
    args: &[String],
    secrets: &Environment,
    temp_files: &mut TempFileFactory,
) -> Result<Vec<String>> {
    if !args.iter().any(|arg| arg == ENV_FILE_ARG) {
        return Ok(args.to_vec());
    }

    let path = temp_files.push(ENV_FILE_ARG, &secrets.to_bytes())?;
    let path = path.display().to_string();
    Ok(args
        .iter()
        .map(|arg| {
            if arg == ENV_FILE_ARG {
                path.clone()
            } else {
                arg.clone()
            }
        })
        .collect())
}

/// The exit status to report for a finished run.
///
/// A child that ran to completion yields its own status; every other failure
/// is returned unchanged.
///
/// # Errors
///
/// Returns the error held by `result`.
pub fn return_status_of(result: Result<RunOutcome>) -> Result<i32> {
    result.map(RunOutcome::exit_code)
}

/// Version report for every provider in the configured directory.
///
/// # Errors
///
/// Returns an error if the provider directory cannot be read.
pub async fn provider_version_report(providers: &ProviderResolver) -> Result<String> {
    Ok(provider_versions(providers.directory()).await?)
}
