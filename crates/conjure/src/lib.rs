//! conjure: run a command with secrets injected into its environment
//!
//! The binary is a thin shell around this library:
//!
//! ```ignore
//! let cli = conjure::cli::parse();
//! let status = conjure::cli::execute(cli).await?;
//! std::process::exit(status);
//! ```
//!
//! Secret resolution lives in [`conjure_secrets`]; this crate adds the
//! command line, the orchestration of one run ([`action`]) and the
//! [`runner`] that supervises the child process.

pub mod action;
pub mod cli;
mod error;
pub mod runner;
pub mod tracing;

pub use action::{ActionConfig, ManifestSource, return_status_of, run_action};
pub use error::{Error, Result};
pub use runner::{RunOutcome, SubcommandRunner, SubcommandState};
