//! Manifest checks
//!
//! Static checks over a parsed (not necessarily valid) manifest. Lint runs
//! every check and reports all findings instead of stopping at the first
//! problem the way validation does.

use crate::core::{
    command::ShellCommand,
    config::{Bindings, ManifestConfig},
    fixtures::FIXTURES_DENY_VAR,
    phase::Phase,
    template,
};
use crate::execution::session::Builtin;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};
use std::sync::OnceLock;

pub const CHECK_MATRIX: &str = "matrix-distinct";
pub const CHECK_FIXTURES: &str = "fixtures-denied";
pub const CHECK_TEST_FLAGS: &str = "test-flags";
pub const CHECK_DIRECTORY_STACK: &str = "directory-stack";
pub const CHECK_BUILD_OFF: &str = "build-off";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One lint result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub check: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn new(check: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check,
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LintReport {
    pub findings: Vec<Finding>,
}

impl LintReport {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Findings of one check
    pub fn for_check(&self, check: &str) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.check == check).collect()
    }
}

/// Run every check; `base_dir` is where the fixture root is resolved
pub fn lint(config: &ManifestConfig, base_dir: &Path) -> LintReport {
    let mut findings = Vec::new();
    check_matrix(config, &mut findings);
    check_fixtures(config, base_dir, &mut findings);
    check_test_flags(config, &mut findings);
    check_directory_stack(config, &mut findings);
    check_build_off(config, &mut findings);
    LintReport { findings }
}

fn check_matrix(config: &ManifestConfig, findings: &mut Vec<Finding>) {
    let entries = match config.matrix_entries() {
        Ok(entries) => entries,
        Err(e) => {
            findings.push(Finding::new(CHECK_MATRIX, Severity::Error, e.to_string()));
            return;
        }
    };

    let before = findings.len();
    let mut seen: HashMap<Bindings, usize> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        let number = index + 1;
        if entry.is_empty() {
            findings.push(Finding::new(
                CHECK_MATRIX,
                Severity::Error,
                format!("matrix entry {} has no variables", number),
            ));
            continue;
        }
        for (key, value) in entry {
            if value.trim().is_empty() {
                findings.push(Finding::new(
                    CHECK_MATRIX,
                    Severity::Error,
                    format!("matrix entry {} has an empty value for '{}'", number, key),
                ));
            }
        }

        let mut key = entry.clone();
        key.sort();
        if let Some(first) = seen.get(&key) {
            findings.push(Finding::new(
                CHECK_MATRIX,
                Severity::Error,
                format!("matrix entries {} and {} resolve to the same bindings", first, number),
            ));
        } else {
            seen.insert(key, number);
        }
    }

    if findings.len() == before && !entries.is_empty() {
        findings.push(Finding::new(
            CHECK_MATRIX,
            Severity::Info,
            format!("{} matrix jobs, all distinct", entries.len()),
        ));
    }
}

fn deletion_verb() -> &'static Regex {
    static DELETE: OnceLock<Regex> = OnceLock::new();
    DELETE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(del|erase|rm|rmdir|rd|remove-item|ri)\b").expect("deletion regex is valid")
    })
}

fn check_fixtures(config: &ManifestConfig, base_dir: &Path, findings: &mut Vec<Finding>) {
    let filter = match config.fixture_filter() {
        Ok(filter) => filter,
        Err(e) => {
            findings.push(Finding::new(CHECK_FIXTURES, Severity::Error, format!("{:#}", e)));
            return;
        }
    };

    let root = filter.root().to_string_lossy().replace('\\', "/");
    for phase in [Phase::Install, Phase::Test] {
        let Ok(plan) = config.phase_plan(phase) else {
            continue;
        };
        for command in plan.commands() {
            let line = command.line.replace('\\', "/");
            if deletion_verb().is_match(&line) && line.contains(root.as_str()) {
                findings.push(Finding::new(
                    CHECK_FIXTURES,
                    Severity::Warning,
                    format!(
                        "'{}' in {} deletes fixtures; list them under fixtures.deny instead",
                        command.line, phase
                    ),
                ));
            }
        }
    }

    if filter.is_empty() {
        return;
    }

    let test_commands = config
        .phase_plan(Phase::Test)
        .map(|plan| plan.commands().to_vec())
        .unwrap_or_default();
    if !test_commands.iter().any(passes_deny_list) {
        findings.push(Finding::new(
            CHECK_FIXTURES,
            Severity::Warning,
            format!(
                "fixtures.deny is set but no test command passes {{{{ fixtures_deny }}}} or {} on",
                FIXTURES_DENY_VAR
            ),
        ));
    }

    let absolute_root = base_dir.join(filter.root());
    if !absolute_root.is_dir() {
        findings.push(Finding::new(
            CHECK_FIXTURES,
            Severity::Warning,
            format!("fixture root '{}' does not exist", filter.root().display()),
        ));
        return;
    }

    match filter.partition(base_dir) {
        Ok(view) => {
            for pattern in filter.unmatched_patterns(&view.denied) {
                findings.push(Finding::new(
                    CHECK_FIXTURES,
                    Severity::Warning,
                    format!("deny pattern '{}' matches no fixture", pattern),
                ));
            }
            findings.push(Finding::new(
                CHECK_FIXTURES,
                Severity::Info,
                format!(
                    "{} of {} fixtures hidden from the test phase",
                    view.denied.len(),
                    view.denied.len() + view.allowed.len()
                ),
            ));
        }
        Err(e) => findings.push(Finding::new(
            CHECK_FIXTURES,
            Severity::Warning,
            format!("could not scan fixture root: {}", e),
        )),
    }
}

/// Whether a command hands the deny list to the test runner
fn passes_deny_list(command: &ShellCommand) -> bool {
    command.line.contains(FIXTURES_DENY_VAR)
        || template::placeholders(&command.line)
            .iter()
            .any(|name| name == "fixtures_deny")
}

fn check_test_flags(config: &ManifestConfig, findings: &mut Vec<Finding>) {
    let flags = &config.checks.test_flags;
    if flags.is_empty() {
        return;
    }

    let commands: Vec<ShellCommand> = match config.phase_plan(Phase::Test) {
        Ok(plan) => plan.commands().to_vec(),
        Err(e) => {
            findings.push(Finding::new(CHECK_TEST_FLAGS, Severity::Error, format!("{:#}", e)));
            return;
        }
    };

    let best = commands.iter().min_by_key(|c| missing_flags(flags, c).len());
    match best {
        None => findings.push(Finding::new(
            CHECK_TEST_FLAGS,
            Severity::Error,
            "test_script has no commands",
        )),
        Some(command) => {
            let missing = missing_flags(flags, command);
            if missing.is_empty() {
                findings.push(Finding::new(
                    CHECK_TEST_FLAGS,
                    Severity::Info,
                    format!("'{}' carries all required flags", command.line),
                ));
            } else {
                let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
                findings.push(Finding::new(
                    CHECK_TEST_FLAGS,
                    Severity::Error,
                    format!("no test command carries {}", names.join(", ")),
                ));
            }
        }
    }
}

/// Flags absent from a command, compared token by token
fn missing_flags<'a>(flags: &'a [String], command: &ShellCommand) -> Vec<&'a String> {
    let tokens: Vec<&str> = command.line.split_whitespace().collect();
    flags.iter().filter(|f| !tokens.contains(&f.as_str())).collect()
}

/// Lexical position relative to where a phase started
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Displacement(Vec<String>);

impl Displacement {
    /// Apply a `cd` argument; `false` for absolute targets
    fn change(&mut self, dir: &str) -> bool {
        let path = Path::new(dir);
        if path.is_absolute() || dir.starts_with('\\') || dir.chars().nth(1) == Some(':') {
            return false;
        }
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if matches!(self.0.last(), Some(last) if last != "..") {
                        self.0.pop();
                    } else {
                        self.0.push("..".to_string());
                    }
                }
                other => self.0.push(other.as_os_str().to_string_lossy().into_owned()),
            }
        }
        true
    }

    fn describe(&self) -> String {
        self.0.join("/")
    }
}

fn check_directory_stack(config: &ManifestConfig, findings: &mut Vec<Finding>) {
    for phase in Phase::ORDERED.iter().chain([Phase::OnFailure, Phase::OnFinish].iter()) {
        let Ok(plan) = config.phase_plan(*phase) else {
            continue;
        };

        let mut position = Displacement::default();
        let mut stack: Vec<Displacement> = Vec::new();
        let mut tracked = true;

        for command in plan.commands() {
            match Builtin::parse(command) {
                Some(Builtin::ChangeDir(dir)) => {
                    if !position.change(&dir.replace('\\', "/")) {
                        tracked = false;
                    }
                }
                Some(Builtin::PushDir(dir)) => {
                    stack.push(position.clone());
                    if !position.change(&dir.replace('\\', "/")) {
                        tracked = false;
                    }
                }
                Some(Builtin::PopDir) => match stack.pop() {
                    Some(previous) => position = previous,
                    None => findings.push(Finding::new(
                        CHECK_DIRECTORY_STACK,
                        Severity::Error,
                        format!("{}: 'popd' without a matching 'pushd'", phase),
                    )),
                },
                _ => {}
            }
        }

        if !stack.is_empty() {
            findings.push(Finding::new(
                CHECK_DIRECTORY_STACK,
                Severity::Error,
                format!("{}: {} 'pushd' without a matching 'popd'", phase, stack.len()),
            ));
        } else if !tracked {
            findings.push(Finding::new(
                CHECK_DIRECTORY_STACK,
                Severity::Warning,
                format!("{}: changes to an absolute directory; cannot verify it returns", phase),
            ));
        } else if position != Displacement::default() {
            findings.push(Finding::new(
                CHECK_DIRECTORY_STACK,
                Severity::Error,
                format!(
                    "{}: ends in '{}' instead of its starting directory",
                    phase,
                    position.describe()
                ),
            ));
        }
    }
}

fn check_build_off(config: &ManifestConfig, findings: &mut Vec<Finding>) {
    match config.build_disabled() {
        Ok(true) => findings.push(Finding::new(
            CHECK_BUILD_OFF,
            Severity::Info,
            "build phase is off; jobs skip it",
        )),
        Ok(false) => {}
        Err(e) => findings.push(Finding::new(CHECK_BUILD_OFF, Severity::Error, e.to_string())),
    }
}
