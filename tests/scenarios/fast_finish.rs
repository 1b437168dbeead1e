//! Test: fast_finish cancels the rest of the matrix after a failure

use crate::helpers::*;
use matrix_ci::core::{ExecutionStatus, Phase};
use matrix_ci::execution::{ExecutionEvent, SchedulingStrategy};

fn manifest(fast_finish: bool) -> String {
    format!(
        r#"
environment:
  matrix:
    - PYTHON: py27
    - PYTHON: py33
    - PYTHON: py34
    - PYTHON: py35
matrix:
  fast_finish: {}
test_script:
  - nosetests
"#,
        fast_finish
    )
}

#[tokio::test]
async fn test_fast_finish_cancels_remaining_jobs() {
    let runner = MockRunner::new().fail_for_var("PYTHON", "py33");
    let log = runner.log();
    let result = run_with(
        pipeline_from_yaml(&manifest(true)),
        runner,
        SchedulingStrategy::Sequential,
    )
    .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_passed(&result, 1);
    assert_job_failed_in(&result, 2, Phase::Test);
    assert_job_cancelled(&result, 3);
    assert_job_cancelled(&result, 4);

    assert!(log.for_job(3).is_empty());
    assert!(log.for_job(4).is_empty());
    assert_eq!(result.pipeline.state.cancelled_jobs, 2);
    assert_eq!(
        result.count_events(|e| matches!(e, ExecutionEvent::JobCancelled { .. })),
        2
    );
}

#[tokio::test]
async fn test_without_fast_finish_every_job_runs() {
    let runner = MockRunner::new().fail_for_var("PYTHON", "py33");
    let log = runner.log();
    let result = run_with(
        pipeline_from_yaml(&manifest(false)),
        runner,
        SchedulingStrategy::Sequential,
    )
    .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_failed_in(&result, 2, Phase::Test);
    assert_job_passed(&result, 3);
    assert_job_passed(&result, 4);
    assert_eq!(log.all().len(), 4);
    assert_eq!(result.pipeline.state.cancelled_jobs, 0);
}

/// An allowed failure does not trigger fast_finish
#[tokio::test]
async fn test_allowed_failure_does_not_cancel() {
    let yaml = format!(
        "{}  allow_failures:\n    - PYTHON: py33\n",
        manifest(true).replace("test_script:\n  - nosetests\n", "")
    ) + "test_script:\n  - nosetests\n";
    let runner = MockRunner::new().fail_for_var("PYTHON", "py33");
    let result = run_with(pipeline_from_yaml(&yaml), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_job_failed_in(&result, 2, Phase::Test);
    assert_job_passed(&result, 3);
    assert_job_passed(&result, 4);
}
