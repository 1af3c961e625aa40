//! CLI module
//!
//! Command-line interface for the output step.
//!
//! # Commands
//!
//! - `run` - Write JSON lines to the configured destination
//! - `validate` - Check the configuration and print resolved settings
//! - `inspect` - Show the schema and rows of a Parquet file
//! - `sweep` - Remove orphaned staging directories

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
