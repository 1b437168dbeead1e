//! Test: denied fixtures are hidden from tests instead of deleted

use crate::helpers::*;
use matrix_ci::core::fixtures::FixtureView;
use matrix_ci::core::ExecutionStatus;
use matrix_ci::execution::SchedulingStrategy;
use std::path::Path;

const YAML: &str = r#"
environment:
  matrix:
    - PYTHON: py27
    - PYTHON: py36
fixtures:
  root: tests/samples
  deny:
    - "loop_*.mkv"
    - "broken/**"
test_script:
  - nosetests --exclude-fixtures={{ fixtures_deny }}
"#;

fn write_fixtures(base: &Path) {
    let root = base.join("tests/samples");
    std::fs::create_dir_all(root.join("broken")).unwrap();
    for file in ["loop_a.mkv", "loop_b.mkv", "clip.mp4", "still.png", "broken/x.ts"] {
        std::fs::write(root.join(file), b"fixture").unwrap();
    }
}

#[tokio::test]
async fn test_denied_fixtures_reach_every_job() {
    let base = scratch_dir("fixtures");
    write_fixtures(&base);

    let pipeline = pipeline_in(YAML, &base);
    assert_eq!(
        pipeline.fixtures.scan(&base),
        FixtureView {
            allowed: vec!["clip.mp4".to_string(), "still.png".to_string()],
            denied: vec![
                "broken/x.ts".to_string(),
                "loop_a.mkv".to_string(),
                "loop_b.mkv".to_string(),
            ],
        }
    );

    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline, runner, SchedulingStrategy::Parallel).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    for call in log.all() {
        assert_eq!(call.var("CI_FIXTURES_ROOT"), Some("tests/samples"));
        assert_eq!(
            call.var("CI_FIXTURES_DENY"),
            Some("broken/x.ts,loop_a.mkv,loop_b.mkv")
        );
        assert_eq!(call.var("CI_FIXTURES_DENY_PATTERNS"), Some("loop_*.mkv,broken/**"));
        assert_eq!(
            call.line,
            "nosetests --exclude-fixtures=broken/x.ts,loop_a.mkv,loop_b.mkv"
        );
    }

    // nothing was removed from disk
    assert!(base.join("tests/samples/loop_a.mkv").exists());
    assert!(base.join("tests/samples/broken/x.ts").exists());

    std::fs::remove_dir_all(&base).ok();
}

#[tokio::test]
async fn test_missing_fixture_root_is_not_fatal() {
    let base = scratch_dir("fixtures");

    let runner = MockRunner::new();
    let log = runner.log();
    let result = run_with(pipeline_in(YAML, &base), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    assert_eq!(log.all()[0].var("CI_FIXTURES_DENY"), Some(""));

    std::fs::remove_dir_all(&base).ok();
}

#[tokio::test]
async fn test_fixtures_fetched_during_install_are_denied() {
    let base = scratch_dir("fixtures");
    let yaml = r#"
fixtures:
  root: tests/samples
  deny:
    - "ffprobe_hang.*"
install:
  - git submodule update --init
test_script:
  - nosetests --exclude-fixtures={{ fixtures_deny }}
"#;

    let fetch_into = base.clone();
    let runner = MockRunner::new().on_command("git submodule", move |_| {
        let root = fetch_into.join("tests/samples");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("ffprobe_hang.mkv"), b"loops").unwrap();
        std::fs::write(root.join("ok.mp4"), b"fine").unwrap();
    });
    let log = runner.log();
    let result = run_with(pipeline_in(yaml, &base), runner, SchedulingStrategy::Sequential).await;

    assert_eq!(result.status, ExecutionStatus::Passed);
    let calls = log.for_job(1);
    assert_eq!(calls[0].var("CI_FIXTURES_DENY"), Some(""));
    assert_eq!(calls[1].line, "nosetests --exclude-fixtures=ffprobe_hang.mkv");
    assert_eq!(calls[1].var("CI_FIXTURES_DENY"), Some("ffprobe_hang.mkv"));
    assert!(base.join("tests/samples/ffprobe_hang.mkv").exists());

    std::fs::remove_dir_all(&base).ok();
}
