//! matrix-ci - run every job of a CI build matrix locally

pub mod cli;
pub mod core;
pub mod execution;
pub mod lint;
pub mod persistence;

// Re-export commonly used types
pub use core::config::ManifestConfig;
pub use core::{ExecutionStatus, Job, JobState, Phase, PhasePlan, Pipeline, ShellCommand, ShellKind};
pub use execution::{
    CommandOutput, CommandRequest, CommandRunner, EngineError, ExecutionEngine, ExecutionEvent,
    RunError, SchedulingStrategy, SystemShell,
};
pub use lint::{lint, Finding, LintReport, Severity};
