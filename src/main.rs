//! BPM CLI entry point.
//!
//! Parses the command line, runs the requested command, and renders
//! failures as user-friendly errors with suggestions before exiting
//! non-zero.

use anyhow::Result;
use bpm_cli::cli;
use bpm_cli::core::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
