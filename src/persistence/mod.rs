//! Persistence layer for matrix run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{Job, JobState, Pipeline};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of one job within a recorded run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub number: usize,

    pub name: String,

    /// `Passed`, `Failed`, `Cancelled` (or `Pending` if the job never ran)
    pub status: ExecutionStatus,

    /// Phase the job failed in
    pub phase: Option<String>,

    pub error: Option<String>,

    pub allow_failure: bool,
}

impl JobSummary {
    pub fn from_job(job: &Job) -> Self {
        let (status, phase, error) = match &job.state {
            JobState::Pending => (ExecutionStatus::Pending, None, None),
            JobState::Running { phase, .. } => {
                (ExecutionStatus::Running, Some(phase.key().to_string()), None)
            }
            JobState::Passed { .. } => (ExecutionStatus::Passed, None, None),
            JobState::Failed { phase, error, .. } => (
                ExecutionStatus::Failed,
                Some(phase.key().to_string()),
                Some(error.clone()),
            ),
            JobState::Cancelled { reason } => {
                (ExecutionStatus::Cancelled, None, Some(reason.clone()))
            }
        };

        Self {
            number: job.number,
            name: job.name.clone(),
            status,
            phase,
            error,
            allow_failure: job.allow_failure,
        }
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,

    pub passed_jobs: usize,

    pub failed_jobs: usize,

    pub cancelled_jobs: usize,

    /// Per-job results in matrix order
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    /// Run duration, if the run completed
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or replace) a run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>>;

    /// Runs of a pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>>;

    /// All pipeline names with recorded runs, sorted
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
    by_pipeline: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let previous = self.runs.write().await.insert(run.execution_id, run.clone());

        if previous.is_none() {
            self.by_pipeline
                .write()
                .await
                .entry(run.pipeline_name.clone())
                .or_default()
                .push(run.execution_id);
        }

        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&execution_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        let mut result: Vec<RunSummary> = by_pipeline
            .get(pipeline_name)
            .map(|ids| ids.iter().filter_map(|id| runs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.by_pipeline.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Create a summary from a pipeline
pub fn create_summary(pipeline: &Pipeline) -> RunSummary {
    RunSummary {
        execution_id: pipeline.state.execution_id,
        pipeline_name: pipeline.name.clone(),
        status: pipeline.state.status,
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        total_jobs: pipeline.state.total_jobs,
        passed_jobs: pipeline.state.passed_jobs,
        failed_jobs: pipeline.state.failed_jobs,
        cancelled_jobs: pipeline.state.cancelled_jobs,
        jobs: pipeline.jobs.iter().map(JobSummary::from_job).collect(),
    }
}
