//! Execution state models

use crate::core::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Jobs are running
    Running,
    /// Every job passed (or failed with an allowed failure)
    Passed,
    /// At least one job failed
    Failed,
    /// Jobs were cancelled and none failed
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Passed => "Passed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Passed" => Some(ExecutionStatus::Passed),
            "Failed" => Some(ExecutionStatus::Failed),
            "Cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

/// State of a single matrix job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Job is waiting for a slot
    Pending,
    /// Job is running a phase
    Running {
        phase: Phase,
        started_at: DateTime<Utc>,
    },
    /// All phases finished with exit code 0
    Passed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        commands_run: usize,
    },
    /// A command exited non-zero (or could not run)
    Failed {
        phase: Phase,
        command: String,
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Job was stopped before finishing
    Cancelled {
        reason: String,
    },
}

impl JobState {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Passed { .. } | JobState::Failed { .. } | JobState::Cancelled { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobState::Failed { .. })
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,

    pub passed_jobs: usize,

    pub failed_jobs: usize,

    pub cancelled_jobs: usize,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            passed_jobs: 0,
            failed_jobs: 0,
            cancelled_jobs: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Mark pipeline as finished with the aggregated status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Update job counts
    pub fn update_counts(&mut self, passed: usize, failed: usize, cancelled: usize) {
        self.passed_jobs = passed;
        self.failed_jobs = failed;
        self.cancelled_jobs = cancelled;
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.passed_jobs + self.failed_jobs + self.cancelled_jobs) as f64 / self.total_jobs as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
