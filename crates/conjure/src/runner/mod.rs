//! Running the target command
//!
//! [`SubcommandRunner`] owns the platform-independent part of the lifecycle:
//! it resolves the executable on the search path, builds the command with the
//! assembled environment, and records the state transitions. Spawning,
//! signal relay and waiting are delegated to a [`ProcessLauncher`], whose
//! implementation is picked at build time.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::SignalRelayLauncher as PlatformLauncher;
#[cfg(windows)]
pub use windows::CtrlRelayLauncher as PlatformLauncher;

use crate::{Error, Result};
use async_trait::async_trait;
use conjure_secrets::Environment;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// How a finished child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Normal exit with the given code
    Exited(i32),
    /// Killed by the given signal number
    Signaled(i32),
}

impl RunOutcome {
    /// The status this tool reports for the outcome.
    ///
    /// Signal termination maps to `128 + signal`, matching shell convention.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal,
        }
    }
}

/// Lifecycle of one subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubcommandState {
    /// Nothing has been spawned yet
    #[default]
    NotStarted,
    /// The child has been handed to the launcher
    Running,
    /// The child exited normally
    Exited(i32),
    /// The child was terminated by a signal
    SignalTerminated(i32),
}

/// Spawns a prepared command and supervises it until it terminates.
///
/// Implementations relay signals received by this process to the child for
/// as long as it runs.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn `command` and wait for it.
    ///
    /// # Errors
    ///
    /// [`Error::SubcommandLaunch`] when the child cannot be started,
    /// [`Error::SubcommandWait`] when waiting fails after it started.
    async fn launch(&self, program: &str, command: Command) -> Result<RunOutcome>;
}

/// Drives one subcommand from `NotStarted` to a terminal state.
#[derive(Debug, Default)]
pub struct SubcommandRunner<L = PlatformLauncher> {
    launcher: L,
    state: SubcommandState,
}

impl SubcommandRunner {
    /// Runner using this platform's launcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<L: ProcessLauncher> SubcommandRunner<L> {
    /// Runner using a specific launcher
    pub fn with_launcher(launcher: L) -> Self {
        Self {
            launcher,
            state: SubcommandState::NotStarted,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SubcommandState {
        self.state
    }

    /// Run `argv` with exactly the variables in `env`.
    ///
    /// Standard streams are inherited from this process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubcommandLaunch`] when `argv` is empty or its program
    /// cannot be found, and propagates launcher errors. A nonzero exit is not
    /// an error.
    pub async fn run(&mut self, argv: &[String], env: &Environment) -> Result<RunOutcome> {
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::launch("", "no command given"));
        };

        let executable = find_executable(program, env)
            .ok_or_else(|| Error::launch(program, "executable file not found in PATH"))?;

        let mut command = Command::new(&executable);
        command
            .args(args)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        tracing::info!(
            program = %program,
            executable = %executable.display(),
            vars = env.len(),
            "Launching subcommand"
        );
        self.state = SubcommandState::Running;

        let outcome = match self.launcher.launch(program, command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, Error::SubcommandLaunch { .. }) {
                    self.state = SubcommandState::NotStarted;
                }
                return Err(e);
            }
        };

        self.state = match outcome {
            RunOutcome::Exited(code) => SubcommandState::Exited(code),
            RunOutcome::Signaled(signal) => SubcommandState::SignalTerminated(signal),
        };
        tracing::debug!(state = ?self.state, "Subcommand finished");
        Ok(outcome)
    }
}

/// Locate `program` the way a shell would, using `env`'s `PATH`.
///
/// Names containing a path separator are used as given. Falls back to this
/// process's `PATH` when `env` has none.
#[must_use]
pub fn find_executable(program: &str, env: &Environment) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let search: OsString = env
        .get("PATH")
        .map(OsString::from)
        .or_else(|| std::env::var_os("PATH"))
        .unwrap_or_default();

    std::env::split_paths(&search)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidate_names(program).map(move |name| dir.join(name)))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn candidate_names(program: &str) -> impl Iterator<Item = String> {
    std::iter::once(program.to_string())
}

#[cfg(windows)]
fn candidate_names(program: &str) -> impl Iterator<Item = String> {
    let program = program.to_string();
    ["", ".exe", ".cmd", ".bat"]
        .into_iter()
        .map(move |ext| format!("{program}{ext}"))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Map a child's exit status onto a [`RunOutcome`]
#[must_use]
pub fn outcome_from_status(status: ExitStatus) -> RunOutcome {
    if let Some(code) = status.code() {
        return RunOutcome::Exited(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return RunOutcome::Signaled(signal);
        }
    }

    RunOutcome::Exited(1)
}

/// Turn the result of waiting on `child` into an outcome.
///
/// A failed wait kills the child before the error is returned.
fn finish(program: &str, child: &mut Child, status: io::Result<ExitStatus>) -> Result<RunOutcome> {
    match status {
        Ok(status) => Ok(outcome_from_status(status)),
        Err(source) => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(program = %program, error = %e, "Failed to kill subcommand");
            }
            Err(Error::SubcommandWait {
                program: program.to_string(),
                source,
            })
        }
    }
}

/// Spawn `command`, mapping failure to a launch error
fn spawn(program: &str, command: &mut Command) -> Result<Child> {
    command
        .spawn()
        .map_err(|e| Error::launch(program, e.to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    /// Launcher reporting a fixed result without spawning anything
    enum FakeLauncher {
        Finishes(RunOutcome),
        CannotStart,
        LosesTrack,
    }

    #[async_trait]
    impl ProcessLauncher for FakeLauncher {
        async fn launch(&self, program: &str, _command: Command) -> Result<RunOutcome> {
            match self {
                Self::Finishes(outcome) => Ok(*outcome),
                Self::CannotStart => Err(Error::launch(program, "refused")),
                Self::LosesTrack => Err(Error::SubcommandWait {
                    program: program.to_string(),
                    source: io::Error::other("wait failed"),
                }),
            }
        }
    }

    async fn state_after(launcher: FakeLauncher) -> SubcommandState {
        let mut runner = SubcommandRunner::with_launcher(launcher);
        assert_eq!(runner.state(), SubcommandState::NotStarted);
        let _ = runner.run(&argv(&["sh"]), &Environment::inherited()).await;
        runner.state()
    }

    #[tokio::test]
    async fn state_follows_the_launcher_result() {
        assert_eq!(
            state_after(FakeLauncher::Finishes(RunOutcome::Exited(4))).await,
            SubcommandState::Exited(4)
        );
        assert_eq!(
            state_after(FakeLauncher::Finishes(RunOutcome::Signaled(15))).await,
            SubcommandState::SignalTerminated(15)
        );
        assert_eq!(
            state_after(FakeLauncher::CannotStart).await,
            SubcommandState::NotStarted
        );
        // A child that was started but could not be waited on is never
        // reported as finished
        assert_eq!(
            state_after(FakeLauncher::LosesTrack).await,
            SubcommandState::Running
        );
    }

    #[tokio::test]
    async fn wait_failure_is_propagated() {
        let err = SubcommandRunner::with_launcher(FakeLauncher::LosesTrack)
            .run(&argv(&["sh"]), &Environment::inherited())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SubcommandWait { ref program, .. } if program == "sh"));
    }

    #[tokio::test]
    async fn failed_wait_kills_the_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        let err = finish("sleep", &mut child, Err(io::Error::other("wait failed"))).unwrap_err();
        assert!(matches!(err, Error::SubcommandWait { ref program, .. } if program == "sleep"));

        let status = child.wait().await.unwrap();
        assert_eq!(outcome_from_status(status), RunOutcome::Signaled(9));
    }

    #[test]
    fn exit_code_mapping() {
        assert_eq!(RunOutcome::Exited(0).exit_code(), 0);
        assert_eq!(RunOutcome::Exited(3).exit_code(), 3);
        assert_eq!(RunOutcome::Signaled(15).exit_code(), 143);
    }

    #[test]
    fn finds_programs_on_env_path() {
        let env: Environment = [("PATH", "/nonexistent:/bin:/usr/bin")].into_iter().collect();
        let found = find_executable("sh", &env).unwrap();
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn missing_program_is_not_found() {
        let env: Environment = [("PATH", "/bin:/usr/bin")].into_iter().collect();
        assert!(find_executable("conjure-definitely-missing", &env).is_none());
    }

    #[tokio::test]
    async fn forwards_exit_code() {
        let mut runner = SubcommandRunner::new();
        assert_eq!(runner.state(), SubcommandState::NotStarted);

        let outcome = runner
            .run(&argv(&["sh", "-c", "exit 3"]), &Environment::inherited())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exited(3));
        assert_eq!(runner.state(), SubcommandState::Exited(3));
    }

    #[tokio::test]
    async fn reports_signal_termination() {
        let mut runner = SubcommandRunner::new();
        let outcome = runner
            .run(&argv(&["sh", "-c", "kill -KILL $$"]), &Environment::inherited())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Signaled(9));
        assert_eq!(runner.state(), SubcommandState::SignalTerminated(9));
    }

    #[tokio::test]
    async fn environment_replaces_inherited_variables() {
        temp_env::async_with_vars([("CONJURE_TEST_LEAK", Some("leaked"))], async {
            let env: Environment = [("PATH", "/bin:/usr/bin"), ("ONLY", "yes")]
                .into_iter()
                .collect();
            let script = r#"test "$ONLY" = yes && test -z "$CONJURE_TEST_LEAK""#;

            let outcome = SubcommandRunner::new()
                .run(&argv(&["sh", "-c", script]), &env)
                .await
                .unwrap();
            assert_eq!(outcome, RunOutcome::Exited(0));
        })
        .await;
    }

    #[tokio::test]
    async fn unknown_program_is_a_launch_error() {
        let mut runner = SubcommandRunner::new();
        let err = runner
            .run(&argv(&["conjure-definitely-missing"]), &Environment::inherited())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SubcommandLaunch { .. }));
        assert_eq!(runner.state(), SubcommandState::NotStarted);
    }

    #[tokio::test]
    async fn empty_argv_is_a_launch_error() {
        let err = SubcommandRunner::new()
            .run(&[], &Environment::inherited())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SubcommandLaunch { .. }));
    }
}
