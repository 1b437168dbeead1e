//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, LintCommand, MatrixCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Run CI matrix manifests locally
#[derive(Debug, Parser, Clone)]
#[command(name = "matrix-ci")]
#[command(version)]
#[command(about = "Run every job of a CI build matrix locally", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the output of every command as it finishes
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run every matrix job of a manifest
    Run(RunCommand),

    /// Validate a manifest
    Validate(ValidateCommand),

    /// List the jobs a manifest expands to
    Matrix(MatrixCommand),

    /// Check a manifest for common mistakes
    Lint(LintCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
