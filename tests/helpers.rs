//! Test utilities for matrix-ci

#![allow(dead_code)]

use async_trait::async_trait;
use matrix_ci::core::config::ManifestConfig;
use matrix_ci::core::{ExecutionStatus, JobState, Phase, Pipeline};
use matrix_ci::execution::{
    CommandOutput, CommandRequest, CommandRunner, ExecutionEngine, ExecutionEvent, RunError,
    SchedulingStrategy,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A command the mock runner received
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// `CI_JOB_NUMBER` of the calling job
    pub job: usize,
    pub line: String,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type Rule = Box<dyn Fn(&CommandRequest) -> Option<i32> + Send + Sync>;
type Effect = Box<dyn Fn(&CommandRequest) + Send + Sync>;

/// Scripted command runner
///
/// Every command succeeds unless a rule returns an exit code for it. Calls
/// are recorded in a log that outlives the engine.
pub struct MockRunner {
    rules: Vec<Rule>,
    effects: Vec<(String, Effect)>,
    log: Arc<Mutex<Vec<RecordedCall>>>,
    delay: Option<Duration>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            effects: Vec::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Fail commands whose line contains `needle`
    pub fn fail_command(self, needle: &str) -> Self {
        let needle = needle.to_string();
        self.fail_when(move |req| req.command.line.contains(&needle), 1)
    }

    /// Fail every command of jobs where `key` has `value`
    pub fn fail_for_var(self, key: &str, value: &str) -> Self {
        let (key, value) = (key.to_string(), value.to_string());
        self.fail_when(
            move |req| req.env.iter().any(|(k, v)| *k == key && *v == value),
            1,
        )
    }

    pub fn fail_when<F>(mut self, predicate: F, exit_code: i32) -> Self
    where
        F: Fn(&CommandRequest) -> bool + Send + Sync + 'static,
    {
        self.rules
            .push(Box::new(move |req: &CommandRequest| predicate(req).then_some(exit_code)));
        self
    }

    /// Run `effect` for commands whose line contains `needle`
    pub fn on_command<F>(mut self, needle: &str, effect: F) -> Self
    where
        F: Fn(&CommandRequest) + Send + Sync + 'static,
    {
        self.effects.push((needle.to_string(), Box::new(effect)));
        self
    }

    /// Sleep before answering each command
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(&self) -> CallLog {
        CallLog(self.log.clone())
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, RunError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let job = request
            .env
            .iter()
            .find(|(k, _)| k == "CI_JOB_NUMBER")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);
        self.log.lock().unwrap().push(RecordedCall {
            job,
            line: request.command.line.clone(),
            cwd: request.cwd.clone(),
            env: request.env.clone(),
        });

        for (needle, effect) in &self.effects {
            if request.command.line.contains(needle.as_str()) {
                effect(request);
            }
        }

        let exit_code = self.rules.iter().find_map(|rule| rule(request)).unwrap_or(0);
        Ok(CommandOutput {
            exit_code,
            stdout: format!("ran: {}", request.command.line),
            stderr: String::new(),
        })
    }
}

/// Shared view of the calls a `MockRunner` received
#[derive(Clone)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    pub fn all(&self) -> Vec<RecordedCall> {
        self.0.lock().unwrap().clone()
    }

    /// Calls made by one job, in order
    pub fn for_job(&self, job: usize) -> Vec<RecordedCall> {
        self.all().into_iter().filter(|c| c.job == job).collect()
    }

    pub fn lines_for_job(&self, job: usize) -> Vec<String> {
        self.for_job(job).into_iter().map(|c| c.line).collect()
    }
}

/// Result of running a manifest with a mock runner
pub struct RunResult {
    pub pipeline: Pipeline,
    pub status: ExecutionStatus,
    pub events: Vec<ExecutionEvent>,
}

impl RunResult {
    pub fn state(&self, job: usize) -> &JobState {
        &self
            .pipeline
            .job(job)
            .unwrap_or_else(|| panic!("no job #{}", job))
            .state
    }

    pub fn count_events<F: Fn(&ExecutionEvent) -> bool>(&self, predicate: F) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

/// Parse a manifest rooted at `base_dir`
pub fn pipeline_in(yaml: &str, base_dir: &Path) -> Pipeline {
    let mut config = ManifestConfig::from_yaml(yaml).expect("manifest should be valid");
    config.base_dir = Some(base_dir.to_path_buf());
    config.to_pipeline().expect("pipeline should build")
}

pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    pipeline_in(yaml, &std::env::temp_dir())
}

/// Run a pipeline with the given runner, collecting every event
pub async fn run_with(
    mut pipeline: Pipeline,
    runner: MockRunner,
    strategy: SchedulingStrategy,
) -> RunResult {
    let engine = ExecutionEngine::new(runner, strategy).without_inherited_env();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let status = engine
        .execute(&mut pipeline)
        .await
        .expect("engine should not error");
    let events = events.lock().unwrap().clone();

    RunResult {
        pipeline,
        status,
        events,
    }
}

/// Fresh scratch directory
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("matrix-ci-{}-{}", tag, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

pub fn assert_job_passed(result: &RunResult, job: usize) {
    assert!(
        matches!(result.state(job), JobState::Passed { .. }),
        "job #{} should pass, got {:?}",
        job,
        result.state(job)
    );
}

pub fn assert_job_failed_in(result: &RunResult, job: usize, phase: Phase) {
    match result.state(job) {
        JobState::Failed { phase: actual, .. } => assert_eq!(
            *actual, phase,
            "job #{} failed in {} instead of {}",
            job, actual, phase
        ),
        other => panic!("job #{} should fail in {}, got {:?}", job, phase, other),
    }
}

pub fn assert_job_cancelled(result: &RunResult, job: usize) {
    assert!(
        matches!(result.state(job), JobState::Cancelled { .. }),
        "job #{} should be cancelled, got {:?}",
        job,
        result.state(job)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_ci::core::ShellCommand;

    fn request(line: &str, env: &[(&str, &str)]) -> CommandRequest {
        CommandRequest {
            command: ShellCommand::plain(line),
            cwd: PathBuf::from("."),
            env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn test_mock_runner_rules() {
        let runner = MockRunner::new()
            .fail_command("nosetests")
            .fail_for_var("PYTHON", "py35");
        let log = runner.log();

        let ok = runner.run(&request("echo hi", &[("CI_JOB_NUMBER", "1")])).await.unwrap();
        let failed = runner.run(&request("nosetests", &[("CI_JOB_NUMBER", "2")])).await.unwrap();
        let by_var = runner
            .run(&request("echo hi", &[("CI_JOB_NUMBER", "3"), ("PYTHON", "py35")]))
            .await
            .unwrap();

        assert!(ok.success());
        assert_eq!(failed.exit_code, 1);
        assert_eq!(by_var.exit_code, 1);
        assert_eq!(log.lines_for_job(2), vec!["nosetests".to_string()]);
        assert_eq!(log.all().len(), 3);
    }
}
