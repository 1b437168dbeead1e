//! Pipeline domain model

use crate::core::{
    config::ManifestConfig,
    fixtures::{FixtureFilter, FIXTURES_DENY_PATTERNS_VAR, FIXTURES_ROOT_VAR},
    job::Job,
    matrix,
    phase::{Phase, PhasePlan},
    state::{ExecutionStatus, JobState, PipelineState},
};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A pipeline ready to run: phases shared by all jobs plus the expanded matrix
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,

    /// Initial working directory of every job
    pub base_dir: PathBuf,

    /// Executables checked on PATH before `init`
    pub requires: Vec<String>,

    pub phases: BTreeMap<Phase, PhasePlan>,

    pub jobs: Vec<Job>,

    /// Cancel remaining jobs after the first counted failure
    pub fast_finish: bool,

    /// Per-command timeout
    pub timeout_secs: u64,

    /// Deny list; jobs scan the fixture root themselves while running
    pub fixtures: FixtureFilter,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from a manifest
    pub fn from_config(config: &ManifestConfig) -> Result<Self> {
        let base_dir = config.base_dir();

        let mut phases = BTreeMap::new();
        for phase in Phase::ORDERED.iter().chain([Phase::OnFailure, Phase::OnFinish].iter()) {
            phases.insert(*phase, config.phase_plan(*phase)?);
        }

        let fixtures = config.fixture_filter()?;
        let jobs = matrix::expand(config)?.iter().map(Job::from_spec).collect();

        Ok(Pipeline {
            name: config.pipeline_name(),
            base_dir,
            requires: config.requires.clone(),
            phases,
            jobs,
            fast_finish: config.matrix.fast_finish,
            timeout_secs: config.timeout_secs(),
            fixtures,
            state: PipelineState::new(),
        })
    }

    /// Commands of a phase
    pub fn plan(&self, phase: Phase) -> PhasePlan {
        self.phases.get(&phase).cloned().unwrap_or_default()
    }

    pub fn job(&self, number: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.number == number)
    }

    pub fn job_mut(&mut self, number: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.number == number)
    }

    /// Keep only the given job numbers (numbers are not renumbered)
    pub fn retain_jobs(&mut self, numbers: &[usize]) {
        if numbers.is_empty() {
            return;
        }
        self.jobs.retain(|j| numbers.contains(&j.number));
    }

    /// Override a variable in every job
    pub fn set_variable(&mut self, key: &str, value: &str) {
        for job in &mut self.jobs {
            job.set_variable(key.to_string(), value.to_string());
        }
    }

    /// Environment variables a job's commands receive (on top of the inherited env)
    ///
    /// `CI_FIXTURES_DENY` is missing here; the executor sets it from a fresh
    /// scan of the fixture root.
    pub fn job_environment(&self, job: &Job) -> Vec<(String, String)> {
        let mut env = job.variables.clone();
        env.push(("CI".to_string(), "True".to_string()));
        env.push(("CI_JOB_NUMBER".to_string(), job.number.to_string()));
        env.push(("CI_JOB_NAME".to_string(), job.name.clone()));
        env.push((
            FIXTURES_ROOT_VAR.to_string(),
            self.fixtures.root().to_string_lossy().into_owned(),
        ));
        env.push((FIXTURES_DENY_PATTERNS_VAR.to_string(), self.fixtures.pattern_list()));
        env
    }

    /// Variables for `{{ name }}` placeholders in a job's commands
    ///
    /// `{{ fixtures_deny }}` is left for the executor to fill in.
    pub fn template_variables(&self, job: &Job) -> HashMap<String, String> {
        let mut vars = job.template_variables();
        vars.insert(
            "fixtures_root".to_string(),
            self.fixtures.root().to_string_lossy().into_owned(),
        );
        vars.insert("pipeline_name".to_string(), self.name.clone());
        vars
    }

    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.state.is_terminal())
    }

    /// Aggregate job results into a pipeline status
    pub fn status(&self) -> ExecutionStatus {
        if !self.is_complete() {
            return if self.jobs.iter().any(|j| !matches!(j.state, JobState::Pending)) {
                ExecutionStatus::Running
            } else {
                ExecutionStatus::Pending
            };
        }

        if self.jobs.iter().any(|j| j.counts_as_failure()) {
            ExecutionStatus::Failed
        } else if self
            .jobs
            .iter()
            .any(|j| matches!(j.state, JobState::Cancelled { .. }))
        {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Passed
        }
    }

    /// Recount job results into the pipeline state
    pub fn update_counts(&mut self) {
        let mut passed = 0;
        let mut failed = 0;
        let mut cancelled = 0;

        for job in &self.jobs {
            match &job.state {
                JobState::Passed { .. } => passed += 1,
                JobState::Failed { .. } => failed += 1,
                JobState::Cancelled { .. } => cancelled += 1,
                _ => {}
            }
        }

        self.state.update_counts(passed, failed, cancelled);
    }
}
