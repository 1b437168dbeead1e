//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;

const DEFAULT_MANIFEST: &str = "appveyor.yml";

/// Run every matrix job of a manifest
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the manifest
    #[arg(short, long, default_value = DEFAULT_MANIFEST)]
    pub file: String,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Job limit for `parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Only run these job numbers (repeatable)
    #[arg(long)]
    pub job: Vec<usize>,

    /// Variable overrides applied to every job (KEY=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub var: Vec<(String, String)>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the rendered job plans without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Per-command timeout in seconds (overrides the manifest)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(self.max_parallel)
            }
        }
    }
}

/// Validate a manifest
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the manifest
    #[arg(short, long, default_value = DEFAULT_MANIFEST)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List the jobs a manifest expands to
#[derive(Debug, Args, Clone)]
pub struct MatrixCommand {
    /// Path to the manifest
    #[arg(short, long, default_value = DEFAULT_MANIFEST)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Check a manifest for common mistakes
#[derive(Debug, Args, Clone)]
pub struct LintCommand {
    /// Path to the manifest
    #[arg(short, long, default_value = DEFAULT_MANIFEST)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run with its job results
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid KEY=VALUE pair: {}", s)),
    }
}
