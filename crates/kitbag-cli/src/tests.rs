//! Unit tests for the CLI runtime, driven through [`run`] with in-memory
//! streams.

use std::fs;
use std::path::Path;

use kitbag_plugins::{InstalledPlugin, RegistryStore};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

const MANIFEST: &str = r"
name: toolkit
version: '1.2.0'
expose: [tk]
commands:
  - name: build
    summary: Build everything
    executor: shell
    program: echo building
  - name: release
    steps:
      - executor: shell
        program: echo one
      - executor: shell
        program: echo two
";

struct Outcome {
    code: ExitCode,
    stdout: String,
    stderr: String,
}

fn invoke(env: &Path, args: &[&str]) -> Outcome {
    let mut argv: Vec<OsString> = vec![OsString::from("kitbag")];
    argv.extend(args.iter().map(OsString::from));
    argv.push(OsString::from("--env-dir"));
    argv.push(env.as_os_str().to_owned());
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run(argv, &mut stdout, &mut stderr);
    Outcome {
        code,
        stdout: String::from_utf8(stdout).expect("stdout utf8"),
        stderr: String::from_utf8(stderr).expect("stderr utf8"),
    }
}

#[fixture]
fn env() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn install(env: &TempDir, install_name: &str) {
    let dir = env.path().join("plugins").join(install_name);
    fs::create_dir_all(&dir).expect("plugin dir");
    fs::write(dir.join("manifest.yaml"), MANIFEST).expect("manifest");
    RegistryStore::new(env.path())
        .register(
            InstalledPlugin::new("toolkit", install_name, "1.2.0")
                .with_source("https://example.invalid/toolkit.git")
                .with_shims(vec![String::from("tk")]),
        )
        .expect("register");
}

#[test]
fn help_is_written_to_stdout() {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run(
        [OsString::from("kitbag"), OsString::from("--help")],
        &mut stdout,
        &mut stderr,
    );
    assert_eq!(code, ExitCode::SUCCESS);
    assert!(String::from_utf8_lossy(&stdout).contains("Usage"));
    assert!(stderr.is_empty());
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run([OsString::from("kitbag")], &mut stdout, &mut stderr);
    assert_eq!(code, ExitCode::FAILURE);
    assert!(!stderr.is_empty());
}

#[rstest]
fn empty_environment_lists_nothing(env: TempDir) {
    let outcome = invoke(env.path(), &["plugin", "list"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert_eq!(outcome.stdout, "No plugins installed.\n");
}

#[rstest]
fn list_renders_table_and_json(env: TempDir) {
    install(&env, "toolkit");

    let table = invoke(env.path(), &["plugin", "list"]);
    assert!(table.stdout.contains("toolkit\ttoolkit\t1.2.0\thttps://example.invalid/toolkit.git"));

    let json = invoke(env.path(), &["plugin", "list", "--json"]);
    let records: serde_json::Value = serde_json::from_str(&json.stdout).expect("json output");
    assert_eq!(records[0]["install_name"], "toolkit");
    assert_eq!(records[0]["shims"], serde_json::json!(["tk"]));
}

#[rstest]
fn info_summarises_the_manifest(env: TempDir) {
    install(&env, "toolkit-2");
    let outcome = invoke(env.path(), &["plugin", "info", "toolkit"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    assert!(outcome.stdout.contains("Name: toolkit\n"));
    assert!(outcome.stdout.contains("Install: toolkit-2\n"));
    assert!(outcome.stdout.contains("  build\tshell\tBuild everything\n"));
    assert!(outcome.stdout.contains("  release\t2 steps\t\n"));
    assert!(outcome.stdout.contains("Shims: tk\n"));
}

#[rstest]
fn remove_deletes_directory_and_record(env: TempDir) {
    install(&env, "toolkit");
    let outcome = invoke(env.path(), &["plugin", "remove", "toolkit"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    assert!(!env.path().join("plugins/toolkit").exists());
    assert!(RegistryStore::new(env.path()).load().expect("load").is_empty());
}

#[rstest]
#[case::unknown("ghost", "not installed")]
#[case::traversal("..", "invalid install name")]
fn remove_rejects_unknown_or_unsafe_names(env: TempDir, #[case] name: &str, #[case] fragment: &str) {
    let outcome = invoke(env.path(), &["plugin", "remove", name]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains(fragment), "stderr: {}", outcome.stderr);
}

#[rstest]
fn run_reports_unknown_plugin_on_one_line(env: TempDir) {
    let outcome = invoke(env.path(), &["run", "ghost", "build"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert_eq!(outcome.stderr.lines().count(), 1);
    assert!(outcome.stderr.contains("plugin directory not found for 'ghost'"));
}

#[cfg(unix)]
#[rstest]
fn run_prints_the_plugin_log(env: TempDir) {
    install(&env, "toolkit");
    let outcome = invoke(env.path(), &["run", "toolkit", "release"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    assert!(outcome.stdout.starts_with("Plugin log: "));
    assert!(outcome.stdout.contains("release-"));
}

#[cfg(unix)]
#[rstest]
fn failed_run_mentions_the_plugin_log(env: TempDir) {
    install(&env, "toolkit");
    let manifest = env.path().join("plugins/toolkit/manifest.yaml");
    fs::write(&manifest, MANIFEST.replace("echo building", "exit 7")).expect("manifest");
    let outcome = invoke(env.path(), &["run", "toolkit", "build"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("process exited with code 7"), "stderr: {}", outcome.stderr);
    assert!(outcome.stderr.contains("plugin log:"));
}
