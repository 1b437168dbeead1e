//! Test: every matrix entry runs as its own isolated job

use crate::helpers::*;
use matrix_ci::core::{ExecutionStatus, Phase};
use matrix_ci::execution::SchedulingStrategy;

const PYTHONS: [&str; 10] = [
    "C:\\Python27",
    "C:\\Python27-x64",
    "C:\\Python33",
    "C:\\Python33-x64",
    "C:\\Python34",
    "C:\\Python34-x64",
    "C:\\Python35",
    "C:\\Python35-x64",
    "C:\\Python36",
    "C:\\Python36-x64",
];

fn manifest() -> String {
    let entries: String = PYTHONS
        .iter()
        .map(|p| format!("    - PYTHON: \"{}\"\n", p.replace('\\', "\\\\")))
        .collect();
    format!(
        r#"
name: storyboard
environment:
  global:
    PATH: /usr/bin
  matrix:
{}
install:
  - cmd: set PATH=%PYTHON%;%PYTHON%\Scripts;%PATH%
  - pip install -e .
build: off
test_script:
  - nosetests --with-coverage --cover-package=storyboard --with-doctest
"#,
        entries
    )
}

/// One job per entry, each seeing only its own interpreter
#[tokio::test]
async fn test_each_entry_gets_its_own_job() {
    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(&manifest()), runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(result.pipeline.jobs.len(), 10);

    for (index, python) in PYTHONS.iter().enumerate() {
        let job = index + 1;
        assert_job_passed(&result, job);

        let calls = log.for_job(job);
        // `set` is handled by the session, so only pip and nosetests reach the runner
        assert_eq!(calls.len(), 2, "job #{} calls: {:?}", job, calls);
        for call in &calls {
            assert_eq!(call.var("PYTHON"), Some(*python));
            assert_eq!(
                call.var("PATH"),
                Some(format!("{};{}\\Scripts;/usr/bin", python, python).as_str())
            );
        }
    }
}

/// Job names come from the matrix bindings
#[tokio::test]
async fn test_job_names_and_numbers() {
    let pipeline = pipeline_from_yaml(&manifest());
    let names: Vec<String> = pipeline.jobs.iter().map(|j| j.name.clone()).collect();
    assert_eq!(names[0], "PYTHON=C:\\Python27");
    assert_eq!(names[9], "PYTHON=C:\\Python36-x64");
    assert_eq!(pipeline.jobs[4].number, 5);
}

/// A failing job leaves every other job untouched
#[tokio::test]
async fn test_failure_is_isolated() {
    let runner = MockRunner::new().fail_for_var("PYTHON", "C:\\Python35");
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(&manifest()), runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_failed_in(&result, 7, Phase::Install);
    for job in (1..=10).filter(|j| *j != 7) {
        assert_job_passed(&result, job);
    }
    // the failed job never reached its test phase
    assert_eq!(log.lines_for_job(7), vec!["pip install -e .".to_string()]);
    assert_eq!(result.pipeline.state.failed_jobs, 1);
    assert_eq!(result.pipeline.state.passed_jobs, 9);
}

/// Session changes made by one job are invisible to the next
#[tokio::test]
async fn test_sequential_jobs_do_not_share_state() {
    let yaml = r#"
environment:
  matrix:
    - FLAVOR: first
    - FLAVOR: second
install:
  - sh: export SEEN="$SEEN $FLAVOR"
test_script:
  - echo check
"#;
    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(yaml), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(log.for_job(1)[0].var("SEEN"), Some(" first"));
    assert_eq!(log.for_job(2)[0].var("SEEN"), Some(" second"));
}

/// Limited parallelism still runs every job
#[tokio::test]
async fn test_limited_parallel_runs_all_jobs() {
    let runner = MockRunner::new().with_delay(std::time::Duration::from_millis(5));
    let log = runner.log();
    let result = run_with(
        pipeline_from_yaml(&manifest()),
        runner,
        SchedulingStrategy::LimitedParallel(3),
    )
    .await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(log.all().len(), 20);
}
