//! Secret resolver implementations
//!
//! - [`ExecProvider`] - runs an external provider executable per secret

mod exec;

pub use exec::ExecProvider;
