//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Columnar output step CLI
#[derive(Parser, Debug)]
#[command(name = "columnar-output")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Step configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Variable for `${NAME}` substitution, as NAME=VALUE (repeatable)
    #[arg(long = "var", global = true)]
    pub vars: Vec<String>,

    /// Output format for reports
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write newline-delimited JSON rows to the configured destination
    Run {
        /// Input file (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Override the configured destination
        #[arg(short, long)]
        destination: Option<String>,

        /// Echo projected rows to stdout as JSON lines
        #[arg(long)]
        emit: bool,
    },

    /// Validate the configuration and show the resolved settings
    Validate,

    /// Print the schema and rows of a Parquet file
    Inspect {
        /// Local path or object store URL
        file: String,

        /// Maximum rows to print
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Remove orphaned staging directories
    Sweep {
        /// Staging root (defaults to the configured one, then the temp dir)
        #[arg(long)]
        staging_dir: Option<PathBuf>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
