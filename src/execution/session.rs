//! Per-job shell session
//!
//! Every command runs in its own shell process, so state that has to survive
//! from one command to the next (working directory, directory stack,
//! variables) lives here. Lines like `pushd docs` or `SET PATH=...` are
//! executed by the session itself instead of a shell.

use crate::core::command::{ShellCommand, ShellKind};
use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// A command line handled by the session rather than a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    ChangeDir(String),
    PushDir(String),
    PopDir,
    /// `set NAME=value` (cmd) - `%NAME%` references are expanded
    SetVar { name: String, value: String },
    /// `export NAME=value` (sh) - `$NAME` references are expanded
    ExportVar { name: String, value: String },
}

/// Shell operators that make a line more than a single builtin
const COMPOUND_MARKERS: [&str; 6] = ["&&", "||", "|", "&", ">", "<"];

impl Builtin {
    /// Recognise a builtin line
    ///
    /// PowerShell lines and compound lines (`cd docs && make`) always go to
    /// the shell.
    pub fn parse(command: &ShellCommand) -> Option<Self> {
        if matches!(command.shell, ShellKind::Ps | ShellKind::Pwsh) {
            return None;
        }
        let line = command.line.trim();
        if line.is_empty() || line.contains('\n') {
            return None;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let word = word.to_ascii_lowercase();

        let is_set = word == "set" && command.shell.is_cmd_like();
        if !is_set && COMPOUND_MARKERS.iter().any(|m| rest.contains(m)) {
            return None;
        }
        if !is_set && word != "export" && rest.contains(';') {
            return None;
        }

        match word.as_str() {
            "cd" | "chdir" => {
                // cmd's `cd /d X` switches drive and directory at once
                let rest = rest
                    .strip_prefix("/d ")
                    .or_else(|| rest.strip_prefix("/D "))
                    .unwrap_or(rest)
                    .trim();
                if rest.is_empty() {
                    None
                } else {
                    Some(Builtin::ChangeDir(unquote(rest)))
                }
            }
            "pushd" if !rest.is_empty() => Some(Builtin::PushDir(unquote(rest))),
            "popd" if rest.is_empty() => Some(Builtin::PopDir),
            "set" if is_set => {
                let assignment = unquote(rest);
                let (name, value) = assignment.split_once('=')?;
                let name = name.trim();
                if name.is_empty() || name.starts_with('/') {
                    return None;
                }
                Some(Builtin::SetVar {
                    name: name.to_string(),
                    value: value.to_string(),
                })
            }
            "export" if !command.shell.is_cmd_like() => {
                let (name, value) = rest.split_once('=')?;
                let name = name.trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return None;
                }
                Some(Builtin::ExportVar {
                    name: name.to_string(),
                    value: unquote(value.trim()),
                })
            }
            _ => None,
        }
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// Working directory, directory stack and environment of one job
#[derive(Debug, Clone)]
pub struct JobSession {
    cwd: PathBuf,
    dir_stack: Vec<PathBuf>,
    env: Vec<(String, String)>,
}

impl JobSession {
    /// Start a session in `cwd` with `base_env` overlaid by `job_env`
    pub fn new<P: AsRef<Path>>(
        cwd: P,
        base_env: impl IntoIterator<Item = (String, String)>,
        job_env: &[(String, String)],
    ) -> Self {
        let mut session = Self {
            cwd: normalize(cwd.as_ref()),
            dir_stack: Vec::new(),
            env: Vec::new(),
        };
        for (key, value) in base_env {
            session.set_var(&key, value);
        }
        for (key, value) in job_env {
            session.set_var(key, value.clone());
        }
        session
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn dir_stack_depth(&self) -> usize {
        self.dir_stack.len()
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    fn position(&self, key: &str) -> Option<usize> {
        if cfg!(windows) {
            self.env.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))
        } else {
            self.env.iter().position(|(k, _)| k == key)
        }
    }

    /// Look up a variable (case-insensitive on Windows)
    pub fn var(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.env[i].1.as_str())
    }

    pub fn set_var(&mut self, key: &str, value: String) {
        match self.position(key) {
            Some(i) => self.env[i].1 = value,
            None => self.env.push((key.to_string(), value)),
        }
    }

    pub fn remove_var(&mut self, key: &str) {
        if let Some(i) = self.position(key) {
            self.env.remove(i);
        }
    }

    /// Expand `%NAME%` references the way cmd does (unknown names stay)
    pub fn expand_cmd(&self, value: &str) -> String {
        static PERCENT: OnceLock<Regex> = OnceLock::new();
        let re = PERCENT.get_or_init(|| Regex::new(r"%([^%\s]+)%").expect("percent regex is valid"));
        re.replace_all(value, |caps: &Captures| match self.lookup_any_case(&caps[1]) {
            Some(v) => v.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
    }

    /// Expand `$NAME` and `${NAME}` references (unknown names become empty)
    pub fn expand_sh(&self, value: &str) -> String {
        static DOLLAR: OnceLock<Regex> = OnceLock::new();
        let re = DOLLAR.get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
                .expect("dollar regex is valid")
        });
        re.replace_all(value, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
            self.var(name).unwrap_or("").to_string()
        })
        .into_owned()
    }

    fn lookup_any_case(&self, key: &str) -> Option<&str> {
        self.var(key).or_else(|| {
            self.env
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str())
        })
    }

    /// Resolve a directory argument against the session cwd
    pub fn resolve(&self, dir: &str) -> PathBuf {
        let expanded = self.expand_cmd(dir);
        normalize(&self.cwd.join(expanded))
    }

    /// Run a builtin, updating the session
    pub fn apply(&mut self, builtin: &Builtin) -> Result<(), String> {
        match builtin {
            Builtin::ChangeDir(dir) => {
                self.cwd = self.existing_dir(dir)?;
            }
            Builtin::PushDir(dir) => {
                let target = self.existing_dir(dir)?;
                self.dir_stack.push(std::mem::replace(&mut self.cwd, target));
            }
            Builtin::PopDir => {
                self.cwd = self
                    .dir_stack
                    .pop()
                    .ok_or_else(|| "popd: directory stack is empty".to_string())?;
            }
            Builtin::SetVar { name, value } => {
                let value = self.expand_cmd(value);
                if value.is_empty() {
                    self.remove_var(name);
                } else {
                    self.set_var(name, value);
                }
            }
            Builtin::ExportVar { name, value } => {
                let value = self.expand_sh(value);
                self.set_var(name, value);
            }
        }
        Ok(())
    }

    fn existing_dir(&self, dir: &str) -> Result<PathBuf, String> {
        let target = self.resolve(dir);
        if target.is_dir() {
            Ok(target)
        } else {
            Err(format!("directory not found: {}", target.display()))
        }
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}
