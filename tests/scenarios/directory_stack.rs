//! Test: pushd/popd/cd carry over between commands of a job

use crate::helpers::*;
use matrix_ci::core::{ExecutionStatus, JobState, Phase};
use matrix_ci::execution::SchedulingStrategy;

const DOCS_YAML: &str = r#"
environment:
  matrix:
    - PYTHON: py27
    - PYTHON: py36
test_script:
  - nosetests
  - pushd docs
  - make html
  - popd
  - python -c "print('back')"
"#;

#[tokio::test]
async fn test_pushd_popd_restores_directory() {
    let base = scratch_dir("dirstack");
    std::fs::create_dir_all(base.join("docs")).unwrap();

    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_in(DOCS_YAML, &base), runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    for job in [1, 2] {
        let calls = log.for_job(job);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].cwd, base);
        assert_eq!(calls[1].line, "make html");
        assert_eq!(calls[1].cwd, base.join("docs"));
        assert_eq!(calls[2].cwd, base);
    }

    std::fs::remove_dir_all(&base).ok();
}

/// `cd` in one phase is still in effect in the next
#[tokio::test]
async fn test_cd_persists_across_phases() {
    let base = scratch_dir("dirstack");
    std::fs::create_dir_all(base.join("src")).unwrap();

    let yaml = "install:\n  - cd src\n  - pip install -e ..\ntest_script:\n  - nosetests\n";
    let runner = MockRunner::new();
    let log = runner.log();
    run_with(pipeline_in(yaml, &base), runner, SchedulingStrategy::Sequential).await;

    let calls = log.for_job(1);
    assert_eq!(calls[0].cwd, base.join("src"));
    assert_eq!(calls[1].cwd, base.join("src"));

    std::fs::remove_dir_all(&base).ok();
}

#[tokio::test]
async fn test_pushd_into_missing_directory_fails_job() {
    let base = scratch_dir("dirstack");

    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_in(DOCS_YAML, &base), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    match result.state(1) {
        JobState::Failed { phase, command, error, .. } => {
            assert_eq!(*phase, Phase::Test);
            assert_eq!(command, "pushd docs");
            assert!(error.contains("directory not found"), "{}", error);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(log.lines_for_job(1), vec!["nosetests".to_string()]);

    std::fs::remove_dir_all(&base).ok();
}

#[tokio::test]
async fn test_popd_on_empty_stack_fails_job() {
    let yaml = "test_script:\n  - popd\n  - nosetests\n";
    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_from_yaml(yaml), runner, SchedulingStrategy::Sequential).await;

    assert_job_failed_in(&result, 1, Phase::Test);
    assert!(log.all().is_empty());
}
