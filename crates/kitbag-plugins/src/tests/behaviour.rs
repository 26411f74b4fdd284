//! Behaviour-driven tests for plugin resolution and dispatch.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::dispatch::{DispatchReport, DispatchRequest};
use crate::dispatch_log::DispatchStatus;
use crate::error::{DispatchError, DispatchFailure, ResolveError};
use crate::executor::ExecutionOutcome;
use crate::registry::{InstalledPlugin, RegistryStore};

use super::{MockExecutor, TestEnv};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    env: TestEnv,
    failing_program: Option<String>,
    calls: Arc<AtomicUsize>,
    result: Option<Result<DispatchReport, DispatchFailure>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld {
        env: TestEnv::new(),
        failing_program: None,
        calls: Arc::new(AtomicUsize::new(0)),
        result: None,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pipeline_manifest(name: &str) -> String {
    format!(
        "name: {name}\nversion: '1.0.0'\nexpose: [tk]\ncommands:\n  - name: pipeline\n    steps:\n      - executor: shell\n        program: one\n      - executor: shell\n        program: two\n      - executor: shell\n        program: three\n"
    )
}

fn executor_for(world: &TestWorld) -> MockExecutor {
    let failing = world.failing_program.clone();
    let calls = Arc::clone(&world.calls);
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .returning(move |invocation, _, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            let failed = failing.as_deref() == Some(invocation.program());
            Ok(ExecutionOutcome::exited(i32::from(failed)))
        });
    executor
}

fn dispatch(world: &mut TestWorld, command: &str, plugin: &str, keep_going: bool) {
    let request = DispatchRequest::new(plugin.trim_matches('"'), command.trim_matches('"'))
        .with_keep_going(keep_going);
    let dispatcher = world.env.dispatcher(executor_for(world));
    world.result = Some(dispatcher.dispatch(&request));
}

fn failure(world: &TestWorld) -> &DispatchFailure {
    world
        .result
        .as_ref()
        .expect("no dispatch captured")
        .as_ref()
        .expect_err("expected failure but dispatch succeeded")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("an installed plugin {name} with a three step pipeline")]
fn given_pipeline(world: &mut TestWorld, name: String) {
    let install_name = name.trim_matches('"');
    world.env.install(install_name, &pipeline_manifest(install_name));
}

#[given("an installed plugin {name} without exposed aliases")]
fn given_no_expose(world: &mut TestWorld, name: String) {
    let install_name = name.trim_matches('"');
    let manifest = pipeline_manifest(install_name).replace("expose: [tk]\n", "");
    world.env.install(install_name, &manifest);
}

#[given("a registry record named {name} for install {install}")]
fn given_registry_record(world: &mut TestWorld, name: String, install: String) {
    RegistryStore::for_layout(world.env.layout())
        .register(InstalledPlugin::new(
            name.trim_matches('"'),
            install.trim_matches('"'),
            "1.0.0",
        ))
        .expect("register plugin");
}

#[given("a hand-edited registry where {name} is claimed by {first} and {second}")]
fn given_ambiguous_registry(world: &mut TestWorld, name: String, first: String, second: String) {
    let logical = name.trim_matches('"');
    let mut document = String::from("plugins:\n");
    for install in [first.trim_matches('"'), second.trim_matches('"')] {
        document.push_str(&format!(
            "  - name: {logical}\n    install_name: {install}\n    installed_at: 2024-01-01T00:00:00Z\n"
        ));
    }
    let path = world.env.layout().registry_path();
    fs::create_dir_all(path.parent().expect("registry parent")).expect("registry dir");
    fs::write(path, document).expect("write registry");
}

#[given("an executor that fails the step running {program}")]
fn given_failing_executor(world: &mut TestWorld, program: String) {
    world.failing_program = Some(program.trim_matches('"').to_owned());
}

#[given("an executor that always succeeds")]
fn given_succeeding_executor(world: &mut TestWorld) {
    world.failing_program = None;
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("command {command} of plugin {plugin} is dispatched")]
fn when_dispatched(world: &mut TestWorld, command: String, plugin: String) {
    dispatch(world, &command, &plugin, false);
}

#[when("command {command} of plugin {plugin} is dispatched with keep going")]
fn when_dispatched_keep_going(world: &mut TestWorld, command: String, plugin: String) {
    dispatch(world, &command, &plugin, true);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the dispatch succeeds")]
fn then_succeeds(world: &mut TestWorld) {
    let result = world.result.as_ref().expect("no dispatch captured");
    assert!(result.is_ok(), "expected success, got {result:?}");
}

#[then("the dispatch fails with {kind}")]
fn then_fails_with(world: &mut TestWorld, kind: String) {
    let error = failure(world).error();
    match kind.trim_matches('"') {
        "step_failed" => assert!(
            matches!(error, DispatchError::StepFailed { .. }),
            "expected StepFailed, got: {error}"
        ),
        "manifest_invalid" => assert!(
            matches!(error, DispatchError::ManifestInvalid { .. }),
            "expected ManifestInvalid, got: {error}"
        ),
        "not_found" => assert!(
            matches!(error, DispatchError::PluginNotFound(ResolveError::NotFound { .. })),
            "expected NotFound, got: {error}"
        ),
        "ambiguous" => assert!(
            matches!(error, DispatchError::PluginNotFound(ResolveError::Ambiguous { .. })),
            "expected Ambiguous, got: {error}"
        ),
        other => panic!(
            "unsupported error kind: '{other}' (supported: step_failed, manifest_invalid, not_found, ambiguous)"
        ),
    }
}

#[then("{count} steps were executed")]
fn then_step_count(world: &mut TestWorld, count: usize) {
    assert_eq!(world.calls.load(Ordering::SeqCst), count);
}

#[then("the ledger records status {status}")]
fn then_ledger_status(world: &mut TestWorld, status: String) {
    let expected = match status.trim_matches('"') {
        "ok" => DispatchStatus::Ok,
        "error" => DispatchStatus::Error,
        "canceled" => DispatchStatus::Canceled,
        other => panic!("unsupported ledger status: '{other}'"),
    };
    let ledger = world.env.ledger();
    assert_eq!(ledger.len(), 1, "expected one ledger record, got {ledger:?}");
    assert!(ledger.iter().all(|record| record.status() == expected));
}

#[then("the ledger records plugin {plugin}")]
fn then_ledger_plugin(world: &mut TestWorld, plugin: String) {
    let expected = plugin.trim_matches('"');
    let ledger = world.env.ledger();
    assert!(
        ledger.iter().any(|record| record.plugin() == expected),
        "expected a ledger record for '{expected}', got {ledger:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/dispatch.feature")]
fn dispatch_behaviour(world: TestWorld) {
    let _ = world;
}
