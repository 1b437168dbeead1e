//! Shell command runner - spawns manifest commands as subprocesses

use crate::core::command::ShellCommand;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Error types for running a command
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("timed out after {0} seconds")]
    Timeout(u64),

    #[error("exited with code {code}")]
    ExitStatus { code: i32, stderr: String },
}

/// Everything needed to run one command line
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: ShellCommand,

    /// Working directory of the job session
    pub cwd: PathBuf,

    /// Complete environment of the job session (nothing else is inherited)
    pub env: Vec<(String, String)>,

    pub timeout_secs: u64,
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The error a non-zero exit stands for, if any
    pub fn exit_error(&self) -> Option<RunError> {
        (!self.success()).then(|| RunError::ExitStatus {
            code: self.exit_code,
            stderr: self.stderr.clone(),
        })
    }
}

/// Trait for command execution - lets tests swap in a scripted runner
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion
    ///
    /// A command that starts and exits non-zero is `Ok`; the caller decides
    /// what a failing exit code means.
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, RunError>;
}

/// Runs commands through the platform shells
#[derive(Debug, Clone, Default)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemShell {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, RunError> {
        let (program, args) = request.command.shell.invocation();
        debug!("Spawning {} for: {}", program, request.command.line);

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&request.cwd)
            .env_clear()
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            // cmd does its own parsing of the command line
            if program == "cmd" {
                command.raw_arg(&request.command.line);
            } else {
                command.arg(&request.command.line);
            }
        }
        #[cfg(not(windows))]
        command.arg(&request.command.line);

        let output = timeout(Duration::from_secs(request.timeout_secs), command.output())
            .await
            .map_err(|_| RunError::Timeout(request.timeout_secs))?
            .map_err(|e| RunError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        // Terminated by a signal
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if exit_code != 0 {
            warn!(
                "'{}' exited with code {}: {}",
                request.command.line,
                exit_code,
                stderr.trim()
            );
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}
