//! Fastbreak - Main Entry Point

use clap::Parser;
use fastbreak::cli::{self, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fastbreak=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    ExitCode::from(cli::run(cli))
}
