//! Thin binary entry point. Argument parsing and the command surface
//! (default-test-run, run-all, retry-only, reset-retry-counts, print-stats,
//! debug-errors-sample, debug-single-target) live in the CLI collaborator;
//! this binary only wires up logging and hands off to the library.

use std::sync::Arc;

use blocksweep::config::{RunConfig, RunConfigArgs};
use blocksweep::logging::{init_logging, LoggingConfig};
use blocksweep::install_cancellation_handler;
use blocksweep::RunContext;

const UPSTREAM_BASE_URL: &str = "https://x.com/i/api";

#[tokio::main]
async fn main() {
    let _guard = match init_logging(&LoggingConfig::default()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            std::process::exit(1);
        }
    };

    let config = match RunConfig::resolve(RunConfigArgs::default()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let context = match RunContext::build(config, UPSTREAM_BASE_URL).await {
        Ok(context) => Arc::new(context),
        Err(e) => {
            tracing::error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    install_cancellation_handler(context.clone());

    match context.run().await {
        Ok(progress) => {
            tracing::info!(
                completed = progress.completed,
                blocked = progress.blocked,
                skipped = progress.skipped,
                errors = progress.errors,
                "run complete"
            );
        }
        Err(e) => {
            tracing::error!("run aborted: {e}");
            std::process::exit(1);
        }
    }
}
