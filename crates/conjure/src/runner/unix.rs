//! Unix launcher: spawn the child and relay signals to it

use super::{ProcessLauncher, RunOutcome, finish, spawn};
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::ExitStatus;
use tokio::process::{Child, Command};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Signals forwarded to the child while it runs.
///
/// Every catchable signal except `SIGCHLD`. `SIGKILL` and `SIGSTOP` cannot be
/// caught, and the synchronous fault signals keep their default action.
const RELAYED_SIGNALS: &[libc::c_int] = &[
    libc::SIGHUP,
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGTRAP,
    libc::SIGABRT,
    libc::SIGUSR1,
    libc::SIGUSR2,
    libc::SIGPIPE,
    libc::SIGALRM,
    libc::SIGTERM,
    libc::SIGCONT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
    libc::SIGURG,
    libc::SIGXCPU,
    libc::SIGXFSZ,
    libc::SIGVTALRM,
    libc::SIGPROF,
    libc::SIGWINCH,
    libc::SIGIO,
    libc::SIGSYS,
];

/// Spawns the child and forwards every relayed signal to it until it exits.
///
/// Handlers are installed before the child is spawned, so no signal arriving
/// after the spawn falls through to the default disposition. Listeners only
/// queue signal numbers; the task that waits on the child is the one that
/// sends them, so nothing is sent once the child has been reaped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalRelayLauncher;

#[async_trait]
impl ProcessLauncher for SignalRelayLauncher {
    async fn launch(&self, program: &str, mut command: Command) -> Result<RunOutcome> {
        let streams = install_handlers()
            .map_err(|e| Error::launch(program, format!("cannot install signal handlers: {e}")))?;

        let mut child = spawn(program, &mut command)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = JoinSet::new();
        for (signo, mut stream) in streams {
            let tx = tx.clone();
            listeners.spawn(async move {
                while stream.recv().await.is_some() {
                    if tx.send(signo).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let status = supervise(&mut child, rx).await;
        listeners.abort_all();
        finish(program, &mut child, status)
    }
}

/// All relayed signals, including the platform-specific ones
fn relayed_signals() -> Vec<libc::c_int> {
    let mut signals = RELAYED_SIGNALS.to_vec();
    #[cfg(target_os = "linux")]
    {
        signals.push(libc::SIGPWR);
        signals.extend(libc::SIGRTMIN()..=libc::SIGRTMAX());
    }
    #[cfg(any(target_os = "macos", target_os = "freebsd"))]
    signals.push(libc::SIGINFO);
    signals
}

fn install_handlers() -> std::io::Result<Vec<(libc::c_int, Signal)>> {
    relayed_signals()
        .into_iter()
        .map(|signo| Ok((signo, signal(SignalKind::from_raw(signo))?)))
        .collect()
}

/// Wait for `child`, forwarding each queued signal while it is still unreaped.
///
/// The receiver is dropped on return, which stops the listeners.
async fn supervise(
    child: &mut Child,
    mut signals: mpsc::UnboundedReceiver<libc::c_int>,
) -> std::io::Result<ExitStatus> {
    let pid = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok());
    if let Some(pid) = pid {
        tracing::debug!(pid, "Relaying signals to subcommand");
    }

    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(signo) = signals.recv() => {
                if let Some(pid) = pid {
                    forward(pid, signo);
                }
            }
        }
    }
}

fn forward(pid: libc::pid_t, signo: libc::c_int) {
    tracing::debug!(pid, signal = signo, "Forwarding signal");
    // SAFETY: kill has no memory-safety preconditions; pid belongs to a child
    // this process spawned and has not yet reaped.
    #[expect(unsafe_code, reason = "Required for POSIX signal forwarding")]
    let rc = unsafe { libc::kill(pid, signo) };
    if rc != 0 {
        tracing::warn!(
            pid,
            signal = signo,
            error = %std::io::Error::last_os_error(),
            "Failed to forward signal"
        );
    }
}
