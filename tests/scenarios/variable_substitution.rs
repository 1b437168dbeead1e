//! Test: variables, templates and CLI-style overrides

use crate::helpers::*;
use matrix_ci::core::ExecutionStatus;
use matrix_ci::execution::SchedulingStrategy;

#[tokio::test]
async fn test_global_matrix_and_inline_variables() {
    let yaml = r#"
environment:
  COVERAGE: "1"
  global:
    PACKAGE: storyboard
  matrix:
    - PYTHON: py27
      PACKAGE: storyboard-legacy
    - PYTHON: py36
test_script:
  - "nosetests --cover-package={{ PACKAGE }} # job {{ job_number }} of {{ pipeline_name }}"
"#;
    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(yaml), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    let first = &log.for_job(1)[0];
    let second = &log.for_job(2)[0];

    assert_eq!(first.var("COVERAGE"), Some("1"));
    assert_eq!(first.var("PACKAGE"), Some("storyboard-legacy"));
    assert_eq!(second.var("PACKAGE"), Some("storyboard"));
    assert_eq!(first.var("CI"), Some("True"));
    assert_eq!(second.var("CI_JOB_NUMBER"), Some("2"));
    assert_eq!(second.var("CI_JOB_NAME"), Some("PYTHON=py36"));
    assert_eq!(
        first.line,
        "nosetests --cover-package=storyboard-legacy # job 1 of pipeline"
    );
}

#[tokio::test]
async fn test_override_applies_to_every_job() {
    let yaml = r#"
environment:
  matrix:
    - PYTHON: py27
    - PYTHON: py36
test_script:
  - nosetests
"#;
    let mut pipeline = pipeline_from_yaml(yaml);
    pipeline.set_variable("NOSE_VERBOSE", "2");
    pipeline.set_variable("PYTHON", "pypy");

    let runner = MockRunner::new();
    let log = runner.log();
    run_with(pipeline, runner, SchedulingStrategy::Parallel).await;

    for call in log.all() {
        assert_eq!(call.var("NOSE_VERBOSE"), Some("2"));
        assert_eq!(call.var("PYTHON"), Some("pypy"));
    }
}

#[tokio::test]
async fn test_selected_jobs_only() {
    let yaml = r#"
environment:
  matrix:
    - PYTHON: py27
    - PYTHON: py34
    - PYTHON: py36
test_script:
  - nosetests
"#;
    let mut pipeline = pipeline_from_yaml(yaml);
    pipeline.retain_jobs(&[3]);

    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline, runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.pipeline.jobs.len(), 1);
    assert_job_passed(&result, 3);
    assert_eq!(log.all().len(), 1);
    assert_eq!(log.all()[0].var("CI_JOB_NUMBER"), Some("3"));
}
