//! Test: `build: off` skips the build phase without failing jobs

use crate::helpers::*;
use matrix_ci::core::{ExecutionStatus, Phase};
use matrix_ci::execution::{ExecutionEvent, SchedulingStrategy};

#[tokio::test]
async fn test_build_off_is_skipped_not_failed() {
    let yaml = r#"
environment:
  matrix:
    - PYTHON: py27
    - PYTHON: py36
install:
  - pip install -e .
build: off
test_script:
  - nosetests
"#;
    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(yaml), runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(
        result.count_events(|e| matches!(e, ExecutionEvent::PhaseSkipped { phase: Phase::Build, .. })),
        2
    );
    assert_eq!(
        result.count_events(|e| matches!(e, ExecutionEvent::PhaseStarted { phase: Phase::Build, .. })),
        0
    );
    assert_eq!(
        log.lines_for_job(1),
        vec!["pip install -e .".to_string(), "nosetests".to_string()]
    );
}

#[tokio::test]
async fn test_build_script_runs_between_install_and_test() {
    let yaml = r#"
install:
  - pip install -e .
build_script:
  - python setup.py build
test_script:
  - nosetests
"#;
    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(yaml), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(
        log.lines_for_job(1),
        vec![
            "pip install -e .".to_string(),
            "python setup.py build".to_string(),
            "nosetests".to_string()
        ]
    );
}

#[tokio::test]
async fn test_failing_build_stops_before_tests() {
    let yaml = "build_script:\n  - python setup.py build\ntest_script:\n  - nosetests\n";
    let runner = MockRunner::new().fail_command("setup.py");
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(yaml), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_failed_in(&result, 1, Phase::Build);
    assert_eq!(log.lines_for_job(1), vec!["python setup.py build".to_string()]);
}
