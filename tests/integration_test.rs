mod common;

use assert_fs::TempDir;
use assert_fs::prelude::*;
use common::{FakeRunner, RecordingSink, bare_repo, write_contexts};
use predicates::prelude::*;
use shipmate::cli::{Cli, CliBuilder};
use shipmate::commands::execute_with;
use shipmate::error::ShipError;
use shipmate::orchestrator::Outcome;

/// Scratch layout: `tree/` is scanned, `cache/myapp.git` is the mirror.
fn setup(contexts: &[&str]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    bare_repo(&temp_dir.path().join("cache/myapp.git"), &[("app.txt", "hello\n")]);
    let tree = temp_dir.child("tree");
    tree.create_dir_all().unwrap();
    write_contexts(tree.path(), contexts);
    temp_dir
}

fn cli(temp_dir: &TempDir) -> CliBuilder {
    Cli::builder()
        .remote("https://example.com/myapp.git")
        .name(temp_dir.path().join("cache/myapp.git"))
        .root(temp_dir.path().join("tree"))
        .rev("v1")
        .quiet(true)
}

fn labels(report: &shipmate::orchestrator::RunReport) -> Vec<String> {
    report.results().iter().map(|r| r.label()).collect()
}

#[test]
fn test_builds_every_context_with_distinct_tags() {
    let temp_dir = setup(&["", "api", "services/worker"]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    let report = execute_with(&cli(&temp_dir).build().unwrap(), None, &runner, &sink).unwrap();

    assert_eq!(
        labels(&report),
        ["myapp:v1", "myapp:v1-api", "myapp:v1-services-worker"]
    );
    assert_eq!(report.succeeded(), 3);
    assert_eq!(runner.builds().len(), 3);
    assert!(
        sink.lines()
            .contains(&"[myapp:v1-api] Step 1/2 for myapp:v1-api".to_string())
    );

    // Workspaces are gone, the scanned tree is untouched.
    temp_dir.child("tree/myapp.git").assert(predicate::path::missing());
    temp_dir.child("tree/api/myapp.git").assert(predicate::path::missing());
    temp_dir
        .child("tree/api/Dockerfile")
        .assert(predicate::str::contains("FROM scratch"));
}

#[test]
fn test_build_uses_workspace_as_context() {
    let temp_dir = setup(&["api"]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    execute_with(
        &cli(&temp_dir).keep_workspaces(true).build().unwrap(),
        None,
        &runner,
        &sink,
    )
    .unwrap();

    let build = &runner.builds()[0];
    let workspace = temp_dir.child("tree/api/myapp.git");
    assert!(build.ends_with(&*workspace.path().to_string_lossy()));
    assert!(build.contains(&*temp_dir.path().join("tree/api/Dockerfile").to_string_lossy()));
    workspace.child("app.txt").assert("hello\n");
}

#[test]
fn test_one_broken_context_does_not_block_siblings() {
    let temp_dir = setup(&["api", "web", "worker"]);
    let runner = FakeRunner::new()
        .failing_extract("web")
        .failing_build("myapp:v1-worker");
    let sink = RecordingSink::default();

    let err = execute_with(&cli(&temp_dir).build().unwrap(), None, &runner, &sink).unwrap_err();

    assert!(matches!(err, ShipError::BuildsFailed { failed: 2, attempted: 3 }));
    assert_eq!(runner.builds().len(), 2);
    temp_dir.child("tree/web/myapp.git").assert(predicate::path::missing());
}

#[test]
fn test_failing_run_reports_each_failure() {
    let temp_dir = setup(&["api", "web"]);
    let runner = FakeRunner::new().failing_build("myapp:v1-web");
    let sink = RecordingSink::default();
    let cli = cli(&temp_dir).build().unwrap();

    let orchestrator = shipmate::orchestrator::Orchestrator::builder()
        .remote(cli.remote())
        .revision(Some(cli.rev()))
        .cache_path(cli.cache_path(None))
        .root(cli.scan_root(None))
        .runner(&runner)
        .sink(&sink)
        .quiet(true)
        .build()
        .unwrap();
    let report = orchestrator.run().unwrap();

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label(), "myapp:v1-web");
    assert!(matches!(
        failures[0].outcome,
        Outcome::Failed(ShipError::BuildFailure { .. })
    ));
    assert!(
        sink.lines()
            .contains(&"[myapp:v1-web] error building myapp:v1-web".to_string())
    );
}

#[test]
fn test_sync_failure_stops_everything() {
    let temp_dir = setup(&["", "api"]);
    let runner = FakeRunner::new().failing_fetch();
    let sink = RecordingSink::default();

    let err = execute_with(&cli(&temp_dir).build().unwrap(), None, &runner, &sink).unwrap_err();

    assert!(matches!(err, ShipError::Sync { .. }));
    assert!(runner.builds().is_empty());
    assert_eq!(runner.calls().len(), 1);
}

#[test]
fn test_mistyped_root_is_an_error_not_an_empty_run() {
    let temp_dir = setup(&["api"]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    let err = execute_with(
        &cli(&temp_dir).root(temp_dir.path().join("tre")).build().unwrap(),
        None,
        &runner,
        &sink,
    )
    .unwrap_err();

    assert!(matches!(err, ShipError::Config(_)));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_cache_inside_scan_root_is_never_a_context() {
    let temp_dir = TempDir::new().unwrap();
    let cache = temp_dir.child("myapp.git");
    bare_repo(cache.path(), &[("app.txt", "hello\n")]);
    cache.child("Dockerfile").write_str("FROM scratch\n").unwrap();
    write_contexts(temp_dir.path(), &["api"]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    let cli = Cli::builder()
        .remote("https://example.com/myapp.git")
        .name("myapp.git")
        .rev("v1")
        .quiet(true)
        .build()
        .unwrap();
    let report = execute_with(&cli, Some(temp_dir.path()), &runner, &sink).unwrap();

    assert_eq!(labels(&report), ["myapp:v1-api"]);
}

#[test]
fn test_root_context_cannot_clobber_a_cache_beside_it() {
    let temp_dir = TempDir::new().unwrap();
    bare_repo(&temp_dir.path().join("myapp.git"), &[("app.txt", "hello\n")]);
    write_contexts(temp_dir.path(), &["", "api"]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    let cli = Cli::builder()
        .remote("https://example.com/myapp.git")
        .name("myapp.git")
        .rev("v1")
        .quiet(true)
        .build()
        .unwrap();
    let err = execute_with(&cli, Some(temp_dir.path()), &runner, &sink).unwrap_err();

    assert!(matches!(err, ShipError::BuildsFailed { failed: 1, attempted: 2 }));
    assert_eq!(runner.builds().len(), 1);
    temp_dir
        .child("myapp.git/HEAD")
        .assert(predicate::path::is_file());
}

#[test]
fn test_prefix_matches_whole_segments() {
    let temp_dir = setup(&["services/api", "service/api", "services-old/api"]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    let report = execute_with(
        &cli(&temp_dir).prefix("services").build().unwrap(),
        None,
        &runner,
        &sink,
    )
    .unwrap();

    assert_eq!(labels(&report), ["myapp:v1-services-api"]);
}

#[test]
fn test_colliding_paths_build_once() {
    let temp_dir = setup(&["a/b", "a-b"]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    let err = execute_with(&cli(&temp_dir).build().unwrap(), None, &runner, &sink).unwrap_err();

    assert!(matches!(err, ShipError::BuildsFailed { failed: 1, attempted: 2 }));
    assert_eq!(runner.builds().len(), 1);
    assert!(runner.builds()[0].contains("--tag myapp:v1-a-b "));
}

#[test]
fn test_empty_tree_succeeds() {
    let temp_dir = setup(&[]);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    let report = execute_with(&cli(&temp_dir).build().unwrap(), None, &runner, &sink).unwrap();

    assert_eq!(report.attempted(), 0);
    assert!(runner.builds().is_empty());
}

#[test]
fn test_parallel_jobs_match_sequential_results() {
    let contexts = ["a", "b", "c", "d", "e", "f"];

    let sequential = {
        let temp_dir = setup(&contexts);
        let runner = FakeRunner::new();
        let report = execute_with(
            &cli(&temp_dir).build().unwrap(),
            None,
            &runner,
            &RecordingSink::default(),
        )
        .unwrap();
        labels(&report)
    };

    let temp_dir = setup(&contexts);
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();
    let report = execute_with(&cli(&temp_dir).jobs(4).build().unwrap(), None, &runner, &sink)
        .unwrap();

    assert_eq!(labels(&report), sequential);
    assert_eq!(sink.lines().len(), 12);
    for context in contexts {
        temp_dir
            .child(format!("tree/{context}/myapp.git"))
            .assert(predicate::path::missing());
    }
}

#[test]
fn test_stale_workspace_content_is_replaced() {
    let temp_dir = setup(&["api"]);
    let stale = temp_dir.child("tree/api/myapp.git");
    stale.child("leftover.txt").write_str("old").unwrap();
    let runner = FakeRunner::new();
    let sink = RecordingSink::default();

    execute_with(
        &cli(&temp_dir).keep_workspaces(true).build().unwrap(),
        None,
        &runner,
        &sink,
    )
    .unwrap();

    stale.child("leftover.txt").assert(predicate::path::missing());
    stale.child("app.txt").assert(predicate::path::exists());
}
