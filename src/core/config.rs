//! Manifest configuration from YAML

use crate::core::{
    command::{ShellCommand, ShellKind},
    fixtures::FixtureFilter,
    phase::{Phase, PhasePlan},
    Pipeline,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Ordered variable bindings (manifest order is kept for display)
pub type Bindings = Vec<(String, String)>;

/// Default per-command timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Top-level manifest loaded from YAML
///
/// Keys the runner does not know about (`platform`, `cache`, `deploy` ...)
/// are ignored so existing manifests load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Pipeline name (defaults to the manifest file stem)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    /// Global variables and the matrix axis
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Matrix behaviour (fast finish, allowed failures)
    #[serde(default)]
    pub matrix: MatrixSettings,

    /// Executables that must be on the job's PATH
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub init: Vec<CommandEntry>,

    #[serde(default)]
    pub install: Vec<CommandEntry>,

    /// `off` disables the build phase
    #[serde(default)]
    pub build: Option<BuildConfig>,

    #[serde(default)]
    pub build_script: Vec<CommandEntry>,

    #[serde(default)]
    pub test_script: Vec<CommandEntry>,

    #[serde(default)]
    pub on_failure: Vec<CommandEntry>,

    #[serde(default)]
    pub on_finish: Vec<CommandEntry>,

    #[serde(default)]
    pub fixtures: FixturesConfig,

    #[serde(default)]
    pub checks: ChecksConfig,

    /// Per-command timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Directory the manifest was loaded from (jobs start here)
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// `environment:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub global: Mapping,

    /// One job per entry
    #[serde(default)]
    pub matrix: Vec<Mapping>,

    /// Plain variables written directly under `environment:`
    #[serde(flatten)]
    pub inline: Mapping,
}

/// `matrix:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixSettings {
    /// Cancel the remaining jobs as soon as one fails
    #[serde(default)]
    pub fast_finish: bool,

    /// Jobs matching any of these binding sets may fail
    #[serde(default)]
    pub allow_failures: Vec<Mapping>,
}

/// `fixtures:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturesConfig {
    #[serde(default = "default_fixtures_root")]
    pub root: PathBuf,

    /// Glob patterns of fixtures hidden from the test phase
    #[serde(default)]
    pub deny: Vec<String>,
}

fn default_fixtures_root() -> PathBuf {
    PathBuf::from("tests/samples")
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            root: default_fixtures_root(),
            deny: Vec::new(),
        }
    }
}

/// `checks:` section, consumed by the linter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// Flags that some test command must carry
    #[serde(default)]
    pub test_flags: Vec<String>,
}

/// A command as written in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandEntry {
    /// `- echo hi`
    Plain(String),
    /// `- ps: Write-Host hi`
    Tagged(BTreeMap<String, String>),
}

impl CommandEntry {
    /// Resolve the entry into a shell command
    pub fn to_command(&self) -> Result<ShellCommand> {
        match self {
            CommandEntry::Plain(line) => Ok(ShellCommand::plain(line.clone())),
            CommandEntry::Tagged(map) => {
                if map.len() != 1 {
                    anyhow::bail!(
                        "Command entry must have exactly one shell key, found {}",
                        map.len()
                    );
                }
                let (tag, line) = map.iter().next().context("empty command entry")?;
                let shell = ShellKind::from_tag(tag)
                    .with_context(|| format!("Unknown shell '{}' (expected cmd, ps, pwsh or sh)", tag))?;
                Ok(ShellCommand::new(shell, line.clone()))
            }
        }
    }
}

/// `build:` value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildConfig {
    /// `build: false`
    Switch(bool),
    /// `build: off`
    Keyword(String),
    /// `build: [commands]`
    Commands(Vec<CommandEntry>),
}

impl BuildConfig {
    /// Whether the build phase is switched off
    pub fn is_disabled(&self) -> Result<bool> {
        match self {
            BuildConfig::Switch(on) => Ok(!on),
            BuildConfig::Keyword(word) => match word.trim().to_ascii_lowercase().as_str() {
                "off" | "false" | "no" => Ok(true),
                "on" | "true" | "yes" => Ok(false),
                other => anyhow::bail!("Unsupported build setting '{}' (expected off or a command list)", other),
            },
            BuildConfig::Commands(_) => Ok(false),
        }
    }
}

/// Render a YAML scalar as a variable value
fn scalar_to_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => anyhow::bail!("Variable '{}' must be a scalar value", key),
    }
}

/// Convert a YAML mapping into ordered bindings
pub fn mapping_to_bindings(map: &Mapping) -> Result<Bindings> {
    map.iter()
        .map(|(k, v)| {
            let key = scalar_to_string("<key>", k)?;
            let value = scalar_to_string(&key, v)?;
            Ok((key, value))
        })
        .collect()
}

impl ManifestConfig {
    /// Load and validate a manifest file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a manifest file without validating it
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let mut config = Self::parse(&content)?;

        config.base_dir = Some(
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        );
        if config.name.is_none() {
            config.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
        }

        Ok(config)
    }

    /// Parse and validate a manifest from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Self::parse(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a manifest from a YAML string without validating it
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: ManifestConfig =
            serde_yaml::from_str(yaml).context("Failed to parse manifest YAML")?;
        Ok(config)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<()> {
        self.global_bindings()?;

        let entries = self.matrix_entries()?;
        let mut seen = HashSet::new();
        for (index, entry) in entries.iter().enumerate() {
            if entry.is_empty() {
                anyhow::bail!("Matrix entry {} has no variables", index + 1);
            }
            for (key, value) in entry {
                if key.trim().is_empty() {
                    anyhow::bail!("Matrix entry {} has an empty variable name", index + 1);
                }
                if value.trim().is_empty() {
                    anyhow::bail!(
                        "Matrix entry {} has an empty value for '{}'",
                        index + 1,
                        key
                    );
                }
            }
            if !seen.insert(normalized(entry)) {
                anyhow::bail!("Matrix entry {} duplicates an earlier entry", index + 1);
            }
        }

        for phase in Phase::ORDERED.iter().chain([Phase::OnFailure, Phase::OnFinish].iter()) {
            for command in self.phase_plan(*phase)?.commands() {
                if command.line.trim().is_empty() {
                    anyhow::bail!("Phase '{}' contains an empty command", phase.key());
                }
            }
        }

        if self.build_disabled()? && !self.build_script.is_empty() {
            anyhow::bail!("build is off but build_script has commands");
        }

        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be at least 1");
        }

        for tool in &self.requires {
            if tool.trim().is_empty() {
                anyhow::bail!("requires contains an empty tool name");
            }
        }

        self.fixture_filter()?;

        for (index, allowed) in self.allow_failures()?.iter().enumerate() {
            let matched = if entries.is_empty() {
                allowed.is_empty()
            } else {
                entries.iter().any(|entry| bindings_contain(entry, allowed))
            };
            if !matched {
                anyhow::bail!(
                    "allow_failures entry {} does not match any matrix job",
                    index + 1
                );
            }
        }

        Ok(())
    }

    /// Pipeline name, falling back to `pipeline`
    pub fn pipeline_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "pipeline".to_string())
    }

    /// Directory jobs start in
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Variables shared by all jobs (inline first, then `global`)
    pub fn global_bindings(&self) -> Result<Bindings> {
        let mut bindings = mapping_to_bindings(&self.environment.inline)?;
        for (key, value) in mapping_to_bindings(&self.environment.global)? {
            set_binding(&mut bindings, key, value);
        }
        Ok(bindings)
    }

    /// Matrix entries in manifest order
    pub fn matrix_entries(&self) -> Result<Vec<Bindings>> {
        self.environment
            .matrix
            .iter()
            .map(mapping_to_bindings)
            .collect()
    }

    pub fn allow_failures(&self) -> Result<Vec<Bindings>> {
        self.matrix
            .allow_failures
            .iter()
            .map(mapping_to_bindings)
            .collect()
    }

    pub fn build_disabled(&self) -> Result<bool> {
        match &self.build {
            Some(build) => build.is_disabled(),
            None => Ok(false),
        }
    }

    /// Resolve the commands of a phase
    pub fn phase_plan(&self, phase: Phase) -> Result<PhasePlan> {
        let entries: Vec<&CommandEntry> = match phase {
            Phase::Init => self.init.iter().collect(),
            Phase::Install => self.install.iter().collect(),
            Phase::Build => {
                if self.build_disabled()? {
                    return Ok(PhasePlan::Disabled);
                }
                let mut entries: Vec<&CommandEntry> = Vec::new();
                if let Some(BuildConfig::Commands(commands)) = &self.build {
                    entries.extend(commands.iter());
                }
                entries.extend(self.build_script.iter());
                entries
            }
            Phase::Test => self.test_script.iter().collect(),
            Phase::OnFailure => self.on_failure.iter().collect(),
            Phase::OnFinish => self.on_finish.iter().collect(),
        };

        let commands = entries
            .into_iter()
            .map(|e| e.to_command())
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid command in '{}'", phase.key()))?;

        Ok(PhasePlan::Commands(commands))
    }

    pub fn fixture_filter(&self) -> Result<FixtureFilter> {
        FixtureFilter::new(&self.fixtures.root, &self.fixtures.deny)
    }

    /// Convert the manifest into a runnable pipeline
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}

/// Insert or replace a binding, keeping the original position
pub fn set_binding(bindings: &mut Bindings, key: String, value: String) {
    match bindings.iter_mut().find(|(k, _)| *k == key) {
        Some(existing) => existing.1 = value,
        None => bindings.push((key, value)),
    }
}

/// Whether `bindings` contains every pair of `subset`
pub fn bindings_contain(bindings: &Bindings, subset: &Bindings) -> bool {
    subset
        .iter()
        .all(|pair| bindings.iter().any(|b| b == pair))
}

fn normalized(bindings: &Bindings) -> Vec<(String, String)> {
    let mut sorted = bindings.clone();
    sorted.sort();
    sorted
}
