//! Fixture deny list
//!
//! Known-bad fixtures are never removed from disk. The manifest names them
//! in `fixtures.deny` and the runner hands the resulting list to the test
//! phase through the job environment.
//!
//! The fixture root is scanned when a job starts and again right before its
//! test phase, so fixtures fetched during `install` are covered.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable holding the fixture root
pub const FIXTURES_ROOT_VAR: &str = "CI_FIXTURES_ROOT";
/// Environment variable holding denied fixture paths
pub const FIXTURES_DENY_VAR: &str = "CI_FIXTURES_DENY";
/// Environment variable holding the raw deny patterns
pub const FIXTURES_DENY_PATTERNS_VAR: &str = "CI_FIXTURES_DENY_PATTERNS";

/// Separator of fixture lists in variables and templates
///
/// A comma is an ordinary character for sh, cmd and PowerShell arguments,
/// unlike `;` which ends a command in sh. Entries containing spaces still
/// need quoting in the manifest.
pub const FIXTURE_LIST_SEPARATOR: &str = ",";

/// A compiled deny pattern
#[derive(Debug, Clone)]
struct DenyPattern {
    source: String,
    regex: Regex,
    /// Patterns without a `/` match the file name only
    basename_only: bool,
}

impl DenyPattern {
    fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(&glob_to_regex(source))
            .with_context(|| format!("Invalid fixture pattern '{}'", source))?;
        Ok(Self {
            source: source.to_string(),
            regex,
            basename_only: !source.contains('/'),
        })
    }

    fn matches(&self, relative: &str) -> bool {
        if self.basename_only {
            let name = relative.rsplit('/').next().unwrap_or(relative);
            self.regex.is_match(name)
        } else {
            self.regex.is_match(relative)
        }
    }
}

/// Translate a glob (`*`, `?`, `**`) into an anchored regex
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` also matches zero directories
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

/// Fixtures split into what the test phase may see and what it must skip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureView {
    pub allowed: Vec<String>,
    pub denied: Vec<String>,
}

impl FixtureView {
    /// Denied paths as a single variable value
    pub fn denied_list(&self) -> String {
        self.denied.join(FIXTURE_LIST_SEPARATOR)
    }
}

/// Deny-list filter over a fixture directory
#[derive(Debug, Clone)]
pub struct FixtureFilter {
    root: PathBuf,
    patterns: Vec<DenyPattern>,
}

impl FixtureFilter {
    pub fn new<P: AsRef<Path>>(root: P, deny: &[String]) -> Result<Self> {
        let patterns = deny
            .iter()
            .map(|p| DenyPattern::new(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            patterns,
        })
    }

    /// Fixture root, relative to the manifest directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.source.as_str()).collect()
    }

    /// Deny patterns as a single variable value
    pub fn pattern_list(&self) -> String {
        self.patterns().join(FIXTURE_LIST_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check a fixture path relative to the root (`/` separated)
    pub fn is_denied(&self, relative: &str) -> bool {
        let relative = relative.replace('\\', "/");
        self.patterns.iter().any(|p| p.matches(&relative))
    }

    /// Patterns that match none of the given fixture paths
    pub fn unmatched_patterns(&self, fixtures: &[String]) -> Vec<&str> {
        self.patterns
            .iter()
            .filter(|p| !fixtures.iter().any(|f| p.matches(f)))
            .map(|p| p.source.as_str())
            .collect()
    }

    /// Walk the fixture root below `base_dir` and split its files
    ///
    /// A missing root yields an empty view.
    pub fn partition<P: AsRef<Path>>(&self, base_dir: P) -> std::io::Result<FixtureView> {
        let root = base_dir.as_ref().join(&self.root);
        let mut files = Vec::new();
        if root.is_dir() {
            collect_files(&root, &root, &mut files)?;
        }
        files.sort();

        let (denied, allowed): (Vec<String>, Vec<String>) =
            files.into_iter().partition(|f| self.is_denied(f));

        Ok(FixtureView { allowed, denied })
    }

    /// Current view of the fixtures below `base_dir`
    ///
    /// Unreadable directories are logged and yield an empty view.
    pub fn scan<P: AsRef<Path>>(&self, base_dir: P) -> FixtureView {
        if self.is_empty() {
            return FixtureView::default();
        }
        match self.partition(base_dir) {
            Ok(view) => {
                debug!(
                    "Fixtures under {}: {} allowed, {} denied",
                    self.root.display(),
                    view.allowed.len(),
                    view.denied.len()
                );
                view
            }
            Err(e) => {
                warn!("Could not scan fixtures under {}: {}", self.root.display(), e);
                FixtureView::default()
            }
        }
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
    }
    Ok(())
}
