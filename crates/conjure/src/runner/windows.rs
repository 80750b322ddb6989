//! Windows launcher: spawn the child and kill it on console interrupts

use super::{ProcessLauncher, RunOutcome, finish, spawn};
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::signal::windows;

/// Spawns the child and terminates it when Ctrl-C or Ctrl-Break arrives.
///
/// Windows has no way to deliver an arbitrary signal to another process, so
/// console interrupts are relayed as a kill.
#[derive(Debug, Default, Clone, Copy)]
pub struct CtrlRelayLauncher;

enum Event {
    Exited(std::io::Result<std::process::ExitStatus>),
    Interrupt,
}

#[async_trait]
impl ProcessLauncher for CtrlRelayLauncher {
    async fn launch(&self, program: &str, mut command: Command) -> Result<RunOutcome> {
        let handler_error =
            |e: std::io::Error| Error::launch(program, format!("cannot install console handlers: {e}"));
        let mut ctrl_c = windows::ctrl_c().map_err(handler_error)?;
        let mut ctrl_break = windows::ctrl_break().map_err(handler_error)?;

        let mut child = spawn(program, &mut command)?;

        loop {
            let event = tokio::select! {
                status = child.wait() => Event::Exited(status),
                _ = ctrl_c.recv() => Event::Interrupt,
                _ = ctrl_break.recv() => Event::Interrupt,
            };

            match event {
                Event::Exited(status) => return finish(program, &mut child, status),
                Event::Interrupt => {
                    tracing::debug!(program = %program, "Console interrupt, killing subcommand");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(program = %program, error = %e, "Failed to kill subcommand");
                    }
                }
            }
        }
    }
}
