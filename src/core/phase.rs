//! Pipeline phases

use crate::core::command::ShellCommand;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered stage of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Install,
    Build,
    Test,
    /// Hook run after a failed job
    OnFailure,
    /// Hook run after every job
    OnFinish,
}

impl Phase {
    /// Main phases, in execution order
    pub const ORDERED: [Phase; 4] = [Phase::Init, Phase::Install, Phase::Build, Phase::Test];

    /// Manifest key of this phase
    pub fn key(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Install => "install",
            Phase::Build => "build",
            Phase::Test => "test_script",
            Phase::OnFailure => "on_failure",
            Phase::OnFinish => "on_finish",
        }
    }

    pub fn is_hook(&self) -> bool {
        matches!(self, Phase::OnFailure | Phase::OnFinish)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Install => "install",
            Phase::Build => "build",
            Phase::Test => "test",
            Phase::OnFailure => "on_failure",
            Phase::OnFinish => "on_finish",
        };
        f.write_str(name)
    }
}

/// Commands planned for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "commands", rename_all = "snake_case")]
pub enum PhasePlan {
    /// Phase runs these commands in order
    Commands(Vec<ShellCommand>),
    /// Phase is switched off (`build: off`); skipped, never failed
    Disabled,
}

impl PhasePlan {
    pub fn empty() -> Self {
        PhasePlan::Commands(Vec::new())
    }

    pub fn commands(&self) -> &[ShellCommand] {
        match self {
            PhasePlan::Commands(commands) => commands,
            PhasePlan::Disabled => &[],
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, PhasePlan::Disabled)
    }
}

impl Default for PhasePlan {
    fn default() -> Self {
        Self::empty()
    }
}
