//! Test: on_failure and on_finish hooks

use crate::helpers::*;
use matrix_ci::core::{ExecutionStatus, Phase};
use matrix_ci::execution::{ExecutionEvent, SchedulingStrategy};

const YAML: &str = r#"
environment:
  matrix:
    - PYTHON: py27
    - PYTHON: py35
test_script:
  - nosetests
on_failure:
  - echo collecting logs for {{ job_name }}
on_finish:
  - echo done
"#;

#[tokio::test]
async fn test_on_failure_only_for_failed_jobs() {
    let runner = MockRunner::new().fail_when(
        |req| req.command.line == "nosetests" && req.env.iter().any(|(_, v)| v == "py35"),
        2,
    );
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(YAML), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(
        log.lines_for_job(1),
        vec!["nosetests".to_string(), "echo done".to_string()]
    );
    assert_eq!(
        log.lines_for_job(2),
        vec![
            "nosetests".to_string(),
            "echo collecting logs for PYTHON=py35".to_string(),
            "echo done".to_string()
        ]
    );
}

#[tokio::test]
async fn test_hook_failure_does_not_change_result() {
    let runner = MockRunner::new().fail_command("echo done");
    let result = run_with(pipeline_from_yaml(YAML), runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_job_passed(&result, 1);
    assert_job_passed(&result, 2);
    assert_eq!(
        result.count_events(|e| matches!(
            e,
            ExecutionEvent::HookFailed {
                phase: Phase::OnFinish,
                ..
            }
        )),
        2
    );
}

#[tokio::test]
async fn test_cancelled_jobs_skip_hooks() {
    let yaml = format!("{}matrix:\n  fast_finish: true\n", YAML);
    let runner = MockRunner::new().fail_for_var("PYTHON", "py27");
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(&yaml), runner, SchedulingStrategy::Sequential).await;

    assert_job_failed_in(&result, 1, Phase::Test);
    assert_job_cancelled(&result, 2);
    assert!(log.for_job(2).is_empty());
}
