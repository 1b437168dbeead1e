//! Shell command model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which shell interprets a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    /// Platform default: `cmd` on Windows, `sh` elsewhere
    Default,
    Cmd,
    /// Windows PowerShell (`pwsh` outside Windows)
    Ps,
    Pwsh,
    Sh,
}

impl ShellKind {
    /// Parse the key of a tagged manifest entry (`cmd:`, `ps:` ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "cmd" => Some(ShellKind::Cmd),
            "ps" => Some(ShellKind::Ps),
            "pwsh" => Some(ShellKind::Pwsh),
            "sh" => Some(ShellKind::Sh),
            _ => None,
        }
    }

    /// Program and leading arguments used to run a line with this shell
    pub fn invocation(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            ShellKind::Default => {
                if cfg!(windows) {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            ShellKind::Cmd => ("cmd", &["/C"]),
            ShellKind::Ps => {
                if cfg!(windows) {
                    ("powershell", &["-NoProfile", "-NonInteractive", "-Command"])
                } else {
                    ("pwsh", &["-NoProfile", "-NonInteractive", "-Command"])
                }
            }
            ShellKind::Pwsh => ("pwsh", &["-NoProfile", "-NonInteractive", "-Command"]),
            ShellKind::Sh => ("sh", &["-c"]),
        }
    }

    /// Whether this shell understands `set NAME=value` style builtins
    pub fn is_cmd_like(&self) -> bool {
        match self {
            ShellKind::Cmd => true,
            ShellKind::Default => cfg!(windows),
            _ => false,
        }
    }
}

/// A single command line of a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    pub shell: ShellKind,
    pub line: String,
}

impl ShellCommand {
    pub fn new(shell: ShellKind, line: impl Into<String>) -> Self {
        Self {
            shell,
            line: line.into(),
        }
    }

    /// A command for the platform default shell
    pub fn plain(line: impl Into<String>) -> Self {
        Self::new(ShellKind::Default, line)
    }

    /// Copy of this command with a different line (used after rendering)
    pub fn with_line(&self, line: String) -> Self {
        Self {
            shell: self.shell,
            line,
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shell {
            ShellKind::Default => write!(f, "{}", self.line),
            ShellKind::Cmd => write!(f, "cmd: {}", self.line),
            ShellKind::Ps => write!(f, "ps: {}", self.line),
            ShellKind::Pwsh => write!(f, "pwsh: {}", self.line),
            ShellKind::Sh => write!(f, "sh: {}", self.line),
        }
    }
}
