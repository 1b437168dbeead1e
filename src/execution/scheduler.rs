//! Job scheduling strategy

/// Strategy for running matrix jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// One job at a time, in matrix order
    Sequential,

    /// All jobs at once
    Parallel,

    /// At most N jobs at once
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

impl SchedulingStrategy {
    /// Number of jobs allowed to run concurrently (always at least 1)
    pub fn max_concurrency(&self, total_jobs: usize) -> usize {
        let limit = match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => total_jobs,
            SchedulingStrategy::LimitedParallel(max) => (*max).min(total_jobs),
        };
        limit.max(1)
    }
}
