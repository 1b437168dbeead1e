//! Test: matrix.allow_failures keeps known-broken jobs from failing the run

use crate::helpers::*;
use matrix_ci::core::{ExecutionStatus, Phase};
use matrix_ci::execution::{ExecutionEvent, SchedulingStrategy};

const YAML: &str = r#"
environment:
  matrix:
    - PYTHON: py27
      ARCH: x86
    - PYTHON: py36
      ARCH: x86
    - PYTHON: py36
      ARCH: x64
matrix:
  allow_failures:
    - ARCH: x64
test_script:
  - nosetests
"#;

#[tokio::test]
async fn test_allowed_failure_keeps_run_green() {
    let runner = MockRunner::new().fail_for_var("ARCH", "x64");
    let result = run_with(pipeline_from_yaml(YAML), runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert!(result.pipeline.job(3).unwrap().allow_failure);
    assert!(!result.pipeline.job(1).unwrap().allow_failure);
    assert_job_failed_in(&result, 3, Phase::Test);
    assert_eq!(result.pipeline.state.failed_jobs, 1);
    assert_eq!(
        result.count_events(|e| matches!(e, ExecutionEvent::JobFailed { allowed: true, .. })),
        1
    );
}

#[tokio::test]
async fn test_other_failures_still_count() {
    let runner = MockRunner::new()
        .fail_for_var("ARCH", "x64")
        .fail_for_var("PYTHON", "py27");
    let result = run_with(pipeline_from_yaml(YAML), runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_failed_in(&result, 1, Phase::Test);
    assert_job_passed(&result, 2);
    assert_job_failed_in(&result, 3, Phase::Test);
}
