//! Matrix execution engine - runs every job of a pipeline and aggregates

use crate::{
    core::{phase::Phase, state::JobState, ExecutionStatus, Pipeline},
    execution::{
        executor::{JobExecutor, JobPlan, FAST_FINISH_REASON},
        scheduler::SchedulingStrategy,
        shell::CommandRunner,
    },
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_jobs: usize,
    },
    JobStarted {
        job: usize,
        label: String,
    },
    PhaseStarted {
        job: usize,
        phase: Phase,
    },
    /// Phase is switched off (`build: off`)
    PhaseSkipped {
        job: usize,
        phase: Phase,
    },
    CommandFinished {
        job: usize,
        phase: Phase,
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    },
    JobPassed {
        job: usize,
    },
    JobFailed {
        job: usize,
        phase: Phase,
        command: String,
        error: String,
        /// Listed in `allow_failures`
        allowed: bool,
    },
    JobCancelled {
        job: usize,
        reason: String,
    },
    HookFailed {
        job: usize,
        phase: Phase,
        error: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, handler: EventHandler) {
        self.handlers.lock().await.push(handler);
    }

    /// Emit an event to all handlers
    pub async fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Engine-level failures (job failures are results, not errors)
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("pipeline has no jobs to run")]
    NoJobs,
}

/// Main matrix execution engine
pub struct ExecutionEngine<R> {
    executor: JobExecutor<R>,
    strategy: SchedulingStrategy,
    events: EventBus,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, strategy: SchedulingStrategy) -> Self {
        Self {
            executor: JobExecutor::new(Arc::new(runner)),
            strategy,
            events: EventBus::new(),
        }
    }

    /// Start jobs from an empty environment instead of the runner's own
    pub fn without_inherited_env(mut self) -> Self {
        self.executor = self.executor.with_inherited_env(false);
        self
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(Arc::new(handler)).await;
    }

    /// Render every job of the pipeline without running anything
    pub fn plan(pipeline: &Pipeline) -> Vec<JobPlan> {
        pipeline
            .jobs
            .iter()
            .map(|job| JobPlan::build(pipeline, job))
            .collect()
    }

    /// Run all jobs and return the aggregated status
    ///
    /// Jobs start in matrix order, bounded by the scheduling strategy. A
    /// failing job never affects the others unless the pipeline has
    /// `fast_finish` set.
    pub async fn execute(&self, pipeline: &mut Pipeline) -> Result<ExecutionStatus, EngineError> {
        if pipeline.jobs.is_empty() {
            return Err(EngineError::NoJobs);
        }

        let execution_id = pipeline.state.execution_id;
        let total = pipeline.jobs.len();
        info!(
            "Starting pipeline {} ({}) with {} jobs",
            pipeline.name, execution_id, total
        );
        pipeline.state.start(total);
        self.events
            .emit(ExecutionEvent::PipelineStarted {
                execution_id,
                pipeline_name: pipeline.name.clone(),
                total_jobs: total,
            })
            .await;

        let plans = Self::plan(pipeline);
        let cancel = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(Semaphore::new(self.strategy.max_concurrency(total)));
        let fast_finish = pipeline.fast_finish;
        let mut tasks: JoinSet<(usize, JobState)> = JoinSet::new();
        let mut task_jobs = HashMap::new();

        for plan in plans {
            // Wait for a slot here so jobs start in matrix order
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("Job semaphore closed unexpectedly");
                    break;
                }
            };

            if cancel.load(Ordering::SeqCst) {
                let state = self.executor.execute(&plan, &cancel, &self.events).await;
                self.record(pipeline, (plan.number, state));
                continue;
            }

            if let Some(job) = pipeline.job_mut(plan.number) {
                job.state = JobState::Running {
                    phase: Phase::Init,
                    started_at: chrono::Utc::now(),
                };
            }

            let executor = self.executor.clone();
            let events = self.events.clone();
            let cancel = cancel.clone();
            let number = plan.number;
            let handle = tasks.spawn(async move {
                let state = executor.execute(&plan, &cancel, &events).await;
                if fast_finish && state.is_failed() && !plan.allow_failure {
                    warn!("Job {} failed, cancelling remaining jobs (fast_finish)", plan.label);
                    cancel.store(true, Ordering::SeqCst);
                }
                drop(permit);
                (plan.number, state)
            });
            task_jobs.insert(handle.id(), number);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => self.record(pipeline, result),
                Err(e) => {
                    // A crashed job fails on its own; the others keep their results
                    let message = e.to_string();
                    let number = task_jobs.get(&e.id()).copied().ok_or(EngineError::Join(e))?;
                    let state = self.crashed(pipeline, number, &message).await;
                    if fast_finish && !pipeline.job(number).map_or(false, |j| j.allow_failure) {
                        cancel.store(true, Ordering::SeqCst);
                    }
                    self.record(pipeline, (number, state));
                }
            }
        }

        // Anything never started is cancelled
        for job in pipeline.jobs.iter_mut() {
            if !job.state.is_terminal() {
                job.state = JobState::Cancelled {
                    reason: FAST_FINISH_REASON.to_string(),
                };
            }
        }
        pipeline.update_counts();

        let status = pipeline.status();
        pipeline.state.finish(status);
        info!("Pipeline {} finished: {:?}", pipeline.name, status);
        self.events
            .emit(ExecutionEvent::PipelineCompleted {
                execution_id,
                status,
            })
            .await;

        Ok(status)
    }

    /// Terminal state for a job whose task died
    async fn crashed(&self, pipeline: &Pipeline, number: usize, error: &str) -> JobState {
        let (phase, started_at) = match pipeline.job(number).map(|j| &j.state) {
            Some(JobState::Running { phase, started_at }) => (*phase, *started_at),
            _ => (Phase::Init, chrono::Utc::now()),
        };
        error!("Job #{} {} in {}", number, error, phase);
        let allowed = pipeline.job(number).map_or(false, |j| j.allow_failure);
        self.events
            .emit(ExecutionEvent::JobFailed {
                job: number,
                phase,
                command: String::new(),
                error: error.to_string(),
                allowed,
            })
            .await;
        JobState::Failed {
            phase,
            command: String::new(),
            error: error.to_string(),
            started_at,
            failed_at: chrono::Utc::now(),
        }
    }

    fn record(&self, pipeline: &mut Pipeline, (number, state): (usize, JobState)) {
        if let Some(job) = pipeline.job_mut(number) {
            job.state = state;
        }
        pipeline.update_counts();
    }
}
