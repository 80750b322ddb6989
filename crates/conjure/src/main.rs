//! conjure CLI entry point

// The binary reports fatal startup errors before tracing exists
#![allow(clippy::print_stderr)]

use conjure::cli::{self, EXIT_INTERNAL, render_error};
use conjure::tracing::{TracingConfig, init_tracing};

fn main() {
    // NOTE: eprintln! is used because tracing may be unusable during a panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("conjure panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
    };
    if let Err(e) = init_tracing(&tracing_config) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: failed to create tokio runtime: {e}");
            std::process::exit(EXIT_INTERNAL);
        }
    };

    let exit_code = rt.block_on(async {
        match cli::execute(cli).await {
            Ok(code) => code,
            Err(e) => {
                tracing::debug!(error = ?e, "Run failed");
                render_error(e);
                EXIT_INTERNAL
            }
        }
    });

    std::process::exit(exit_code);
}
