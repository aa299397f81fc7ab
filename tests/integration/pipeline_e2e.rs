//! End-to-end buildtest chain tests.
//!
//! These verify the sequencing invariant: steps run strictly in order and
//! the first failing step aborts everything after it.

use tokio_util::sync::CancellationToken;

use nacre::Error;

use crate::fixtures::TestProject;

/// Test: Happy path
/// Given a clean source tree and passing tests
/// When buildtest runs
/// Then compile, clean, lint, and test all execute in order
#[tokio::test]
async fn test_buildtest_happy_path() {
    let project = TestProject::new();
    let orchestrator = project.orchestrator(CancellationToken::new());

    orchestrator.run_alias("buildtest").await.unwrap();

    assert_eq!(project.steps_log(), "compile\ntest\n");
}

/// Test: Compile failure short-circuits
/// Given a malformed source file
/// When buildtest runs
/// Then a CompileError is raised and lint/test never execute
#[tokio::test]
async fn test_malformed_source_stops_at_compile() {
    let project = TestProject::with_tools(
        "echo 'src/app.ts(1,9): error TS1109: expression expected' >&2; exit 2",
        "echo '2 passing'",
    );
    project.write_source("let board = ;\n");
    let orchestrator = project.orchestrator(CancellationToken::new());

    let result = orchestrator.run_alias("buildtest").await;

    match result {
        Err(Error::Compile { file, line, .. }) => {
            assert_eq!(file, "src/app.ts");
            assert_eq!(line, 1);
        }
        other => panic!("expected Compile error, got {:?}", other),
    }
    // Only the compiler ran; the test runner was never invoked.
    assert_eq!(project.steps_log(), "compile\n");
}

/// Test: Lint failure blocks the test runner
/// Given a source file violating an error-severity rule
/// When buildtest runs
/// Then lint fails and the test runner never executes
#[tokio::test]
async fn test_rule_violation_stops_at_lint() {
    let project = TestProject::new();
    project.write_source("let board = [];\t\n");
    let orchestrator = project.orchestrator(CancellationToken::new());

    let result = orchestrator.run_alias("buildtest").await;

    assert!(matches!(result, Err(Error::Lint { errors: 1 })));
    assert_eq!(project.steps_log(), "compile\n");
    assert_eq!(project.step_count("test"), 0);
}

/// Test: Cleanup idempotence
/// Given transient compiler droppings
/// When buildtest runs twice
/// Then both runs succeed and the second finds nothing to remove
#[tokio::test]
async fn test_cleanup_idempotent_across_runs() {
    let project = TestProject::new();
    std::fs::write(project.path().join("tscommand-abc.tmp.txt"), "").unwrap();
    let orchestrator = project.orchestrator(CancellationToken::new());

    orchestrator.run_alias("buildtest").await.unwrap();
    assert!(!project.path().join("tscommand-abc.tmp.txt").exists());

    // Second run over the already-clean tree: identical end state.
    orchestrator.run_alias("buildtest").await.unwrap();
    assert_eq!(project.step_count("compile"), 2);
    assert_eq!(project.step_count("test"), 2);
}

/// Test: Failing tests propagate
/// Given a harness with one failing test
/// When buildtest runs
/// Then the alias fails after the test step
#[tokio::test]
async fn test_failing_harness_fails_alias() {
    let project = TestProject::with_tools(
        "exit 0",
        "echo '4 passing (12ms)'; echo '1 failing'; exit 3",
    );
    let orchestrator = project.orchestrator(CancellationToken::new());

    let result = orchestrator.run_alias("buildtest").await;

    assert!(matches!(result, Err(Error::TestRunner(_))));
    assert_eq!(project.steps_log(), "compile\ntest\n");
}

/// Test: Unknown alias
/// Given a name with no registered alias
/// When it is run
/// Then the orchestrator fails without executing anything
#[tokio::test]
async fn test_unknown_alias_runs_nothing() {
    let project = TestProject::new();
    let orchestrator = project.orchestrator(CancellationToken::new());

    let result = orchestrator.run_alias("deploy").await;

    assert!(matches!(result, Err(Error::UnknownAlias(_))));
    assert_eq!(project.steps_log(), "");
}
