//! Job executor - runs the phases of one matrix job

use crate::{
    core::{
        command::ShellCommand,
        fixtures::{FixtureFilter, FIXTURES_DENY_VAR},
        phase::{Phase, PhasePlan},
        state::JobState,
        template, Job, Pipeline,
    },
    execution::{
        engine::{EventBus, ExecutionEvent},
        session::{Builtin, JobSession},
        shell::{CommandRequest, CommandRunner},
        tools,
    },
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Reason recorded for jobs stopped by `fast_finish`
pub const FAST_FINISH_REASON: &str = "cancelled by fast_finish after a failed job";

/// Everything one job needs to run, rendered for that job
#[derive(Debug, Clone, Serialize)]
pub struct JobPlan {
    pub number: usize,
    pub label: String,
    pub allow_failure: bool,
    pub base_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub requires: Vec<String>,
    /// Main phases in execution order
    pub phases: Vec<(Phase, PhasePlan)>,
    pub on_failure: Vec<ShellCommand>,
    pub on_finish: Vec<ShellCommand>,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub fixtures: FixtureFilter,
}

impl JobPlan {
    /// Render the pipeline's phases for one job
    pub fn build(pipeline: &Pipeline, job: &Job) -> Self {
        let vars = pipeline.template_variables(job);
        let render = |plan: PhasePlan| match plan {
            PhasePlan::Commands(commands) => PhasePlan::Commands(
                commands
                    .iter()
                    .map(|c| c.with_line(template::render(&c.line, &vars)))
                    .collect(),
            ),
            PhasePlan::Disabled => PhasePlan::Disabled,
        };

        let phases = Phase::ORDERED
            .iter()
            .map(|phase| (*phase, render(pipeline.plan(*phase))))
            .collect();

        Self {
            number: job.number,
            label: job.label(),
            allow_failure: job.allow_failure,
            base_dir: pipeline.base_dir.clone(),
            env: pipeline.job_environment(job),
            requires: pipeline.requires.clone(),
            phases,
            on_failure: render(pipeline.plan(Phase::OnFailure)).commands().to_vec(),
            on_finish: render(pipeline.plan(Phase::OnFinish)).commands().to_vec(),
            timeout_secs: pipeline.timeout_secs,
            fixtures: pipeline.fixtures.clone(),
        }
    }
}

/// Inherited environment, minus variables that are not valid UTF-8
fn inherited_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                debug!("Skipping non UTF-8 environment variable {:?}", key);
                None
            }
        })
        .collect()
}

/// Scan the fixture root and publish the deny list to the session
///
/// Returns the template variables that depend on the scan.
fn refresh_fixtures(plan: &JobPlan, session: &mut JobSession) -> HashMap<String, String> {
    let denied = plan.fixtures.scan(&plan.base_dir).denied_list();
    session.set_var(FIXTURES_DENY_VAR, denied.clone());
    HashMap::from([("fixtures_deny".to_string(), denied)])
}

fn render_command(command: &ShellCommand, vars: &HashMap<String, String>) -> ShellCommand {
    command.with_line(template::render(&command.line, vars))
}

fn render_all(commands: &[ShellCommand], vars: &HashMap<String, String>) -> Vec<ShellCommand> {
    commands.iter().map(|c| render_command(c, vars)).collect()
}

/// Where a job stopped
struct Failure {
    phase: Phase,
    command: String,
    error: String,
}

/// Runs jobs with a command runner
pub struct JobExecutor<R> {
    runner: Arc<R>,
    inherit_env: bool,
}

impl<R> Clone for JobExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            inherit_env: self.inherit_env,
        }
    }
}

impl<R: CommandRunner + 'static> JobExecutor<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            inherit_env: true,
        }
    }

    /// Whether jobs start from the runner's own environment
    pub fn with_inherited_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Run one job to a terminal state
    pub async fn execute(&self, plan: &JobPlan, cancel: &AtomicBool, events: &EventBus) -> JobState {
        if cancel.load(Ordering::SeqCst) {
            return self.cancelled(plan, events).await;
        }

        info!("Starting job {}", plan.label);
        let started_at = Utc::now();
        events
            .emit(ExecutionEvent::JobStarted {
                job: plan.number,
                label: plan.label.clone(),
            })
            .await;

        let base_env = if self.inherit_env {
            inherited_env()
        } else {
            Vec::new()
        };
        let mut session = JobSession::new(&plan.base_dir, base_env, &plan.env);
        let mut fixture_vars = refresh_fixtures(plan, &mut session);

        let mut commands_run = 0;
        let mut failure = None;

        if let Err(missing) = tools::preflight(&plan.requires, &session) {
            failure = Some(Failure {
                phase: Phase::Init,
                command: format!("requires: {}", plan.requires.join(", ")),
                error: format!("required tools not found on PATH: {}", missing.join(", ")),
            });
        }

        if failure.is_none() {
            'phases: for (phase, phase_plan) in &plan.phases {
                if phase_plan.is_disabled() {
                    debug!("Job {}: {} is off", plan.label, phase);
                    events
                        .emit(ExecutionEvent::PhaseSkipped {
                            job: plan.number,
                            phase: *phase,
                        })
                        .await;
                    continue;
                }
                if phase_plan.commands().is_empty() {
                    continue;
                }
                // install may have fetched fixtures
                if *phase == Phase::Test {
                    fixture_vars = refresh_fixtures(plan, &mut session);
                }

                events
                    .emit(ExecutionEvent::PhaseStarted {
                        job: plan.number,
                        phase: *phase,
                    })
                    .await;

                for command in phase_plan.commands() {
                    if cancel.load(Ordering::SeqCst) {
                        return self.cancelled(plan, events).await;
                    }
                    let command = render_command(command, &fixture_vars);
                    match self
                        .run_command(plan, &mut session, *phase, &command, events)
                        .await
                    {
                        Ok(()) => commands_run += 1,
                        Err(error) => {
                            failure = Some(Failure {
                                phase: *phase,
                                command: command.to_string(),
                                error,
                            });
                            break 'phases;
                        }
                    }
                }
            }
        }

        let state = match failure {
            None => {
                info!("Job {} passed ({} commands)", plan.label, commands_run);
                events.emit(ExecutionEvent::JobPassed { job: plan.number }).await;
                JobState::Passed {
                    started_at,
                    finished_at: Utc::now(),
                    commands_run,
                }
            }
            Some(Failure { phase, command, error }) => {
                error!("Job {} failed in {}: {} ({})", plan.label, phase, command, error);
                events
                    .emit(ExecutionEvent::JobFailed {
                        job: plan.number,
                        phase,
                        command: command.clone(),
                        error: error.clone(),
                        allowed: plan.allow_failure,
                    })
                    .await;
                JobState::Failed {
                    phase,
                    command,
                    error,
                    started_at,
                    failed_at: Utc::now(),
                }
            }
        };

        if state.is_failed() {
            let hook = render_all(&plan.on_failure, &fixture_vars);
            self.run_hook(plan, &mut session, Phase::OnFailure, &hook, events)
                .await;
        }
        let hook = render_all(&plan.on_finish, &fixture_vars);
        self.run_hook(plan, &mut session, Phase::OnFinish, &hook, events)
            .await;

        state
    }

    async fn cancelled(&self, plan: &JobPlan, events: &EventBus) -> JobState {
        info!("Job {} cancelled", plan.label);
        events
            .emit(ExecutionEvent::JobCancelled {
                job: plan.number,
                reason: FAST_FINISH_REASON.to_string(),
            })
            .await;
        JobState::Cancelled {
            reason: FAST_FINISH_REASON.to_string(),
        }
    }

    /// Run a single command in the job session
    async fn run_command(
        &self,
        plan: &JobPlan,
        session: &mut JobSession,
        phase: Phase,
        command: &ShellCommand,
        events: &EventBus,
    ) -> Result<(), String> {
        debug!("Job {} [{}]: {}", plan.label, phase, command);
        let started = Instant::now();

        let (result, stdout, stderr, exit_code) = match Builtin::parse(command) {
            Some(builtin) => match session.apply(&builtin) {
                Ok(()) => (Ok(()), String::new(), String::new(), 0),
                Err(e) => (Err(e.clone()), String::new(), e, 1),
            },
            None => {
                let request = CommandRequest {
                    command: command.clone(),
                    cwd: session.cwd().to_path_buf(),
                    env: session.env().to_vec(),
                    timeout_secs: plan.timeout_secs,
                };
                match self.runner.run(&request).await {
                    Ok(output) => {
                        let result = match output.exit_error() {
                            Some(e) => Err(e.to_string()),
                            None => Ok(()),
                        };
                        (result, output.stdout, output.stderr, output.exit_code)
                    }
                    Err(e) => (Err(e.to_string()), String::new(), e.to_string(), -1),
                }
            }
        };

        events
            .emit(ExecutionEvent::CommandFinished {
                job: plan.number,
                phase,
                command: command.to_string(),
                exit_code,
                stdout,
                stderr,
                duration_ms: started.elapsed().as_millis() as u64,
            })
            .await;

        result
    }

    /// Run hook commands; failures are reported but never change the job result
    async fn run_hook(
        &self,
        plan: &JobPlan,
        session: &mut JobSession,
        phase: Phase,
        commands: &[ShellCommand],
        events: &EventBus,
    ) {
        for command in commands {
            if let Err(error) = self.run_command(plan, session, phase, command, events).await {
                warn!("Job {} {} hook failed: {} ({})", plan.label, phase, command, error);
                events
                    .emit(ExecutionEvent::HookFailed {
                        job: plan.number,
                        phase,
                        error,
                    })
                    .await;
                return;
            }
        }
    }
}
