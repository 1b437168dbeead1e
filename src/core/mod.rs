//! Core domain models
//!
//! This module defines the manifest, the matrix expansion and the
//! jobs and phases a pipeline run is made of.

pub mod command;
pub mod config;
pub mod fixtures;
pub mod job;
pub mod matrix;
pub mod phase;
pub mod pipeline;
pub mod state;
pub mod template;

pub use command::{ShellCommand, ShellKind};
pub use job::Job;
pub use phase::{Phase, PhasePlan};
pub use pipeline::*;
pub use state::*;
