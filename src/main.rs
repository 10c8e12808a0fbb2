//! billing-jobs: duplicate-free enqueueing of billing background jobs.
//!
//! This is the main entry point for the `billing-jobs` CLI. It parses
//! arguments, sets up logging, dispatches to the appropriate command
//! handler, and maps errors to exit codes.

mod cli;
mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod jobs;
pub mod locks;
pub mod store;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Logs go to stderr so stdout stays machine-readable (job ids).
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            eprintln!("Error: {}", err);
            if err.is_transient() {
                eprintln!("This may succeed if retried later.");
            }

            ExitCode::from(err.exit_code() as u8)
        }
    }
}
