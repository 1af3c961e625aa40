//! Columnar output CLI
//!
//! Command-line interface for running the output step

use clap::Parser;
use columnar_output::cli::{Cli, Runner};

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports and emitted rows
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::new(cli);

    if let Err(e) = runner.run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
