//! Integration tests for the `kitbag` binary entry point.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn help_lists_subcommands() {
    let mut command = cargo_bin_cmd!("kitbag");
    command.arg("--help");
    command
        .assert()
        .success()
        .stdout(contains("run").and(contains("plugin")));
}

#[test]
fn env_dir_is_read_from_the_environment() -> anyhow::Result<()> {
    let env = TempDir::new()?;
    let mut command = cargo_bin_cmd!("kitbag");
    command.env("KITBAG_ENV_DIR", env.path()).args(["plugin", "list"]);
    command
        .assert()
        .success()
        .stdout(contains("No plugins installed."));
    Ok(())
}

#[test]
fn unknown_plugin_fails_with_a_diagnostic() -> anyhow::Result<()> {
    let env = TempDir::new()?;
    let mut command = cargo_bin_cmd!("kitbag");
    command
        .arg("--env-dir")
        .arg(env.path())
        .args(["run", "ghost", "build"]);
    command
        .assert()
        .failure()
        .stderr(contains("plugin directory not found for 'ghost'"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn stdio_plugin_output_is_echoed() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let env = TempDir::new()?;
    let plugin_dir = env.path().join("plugins/notes");
    fs::create_dir_all(&plugin_dir)?;
    fs::write(
        plugin_dir.join("manifest.yaml"),
        "name: notes\nversion: '0.1.0'\nexpose: [notes]\nentry:\n  type: stdio\n  path: ./notes.sh\n",
    )?;
    let script = plugin_dir.join("notes.sh");
    fs::write(
        &script,
        "#!/bin/sh\ncat >/dev/null\necho '{\"status\":\"ok\",\"logs\":[\"noted\"],\"artifacts\":[\"notes.txt\"],\"mutations\":{\"global\":{\"notes\":{\"count\":1}}}}'\n",
    )?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

    let mut command = cargo_bin_cmd!("kitbag");
    command
        .arg("--env-dir")
        .arg(env.path())
        .args(["run", "notes", "add", "--merge", "append", "--", "hello"]);
    command.assert().success().stdout(
        contains("noted\n")
            .and(contains("Artifact: notes.txt\n"))
            .and(contains("Plugin log: ")),
    );

    let global = fs::read_to_string(env.path().join("kitbag.yaml"))?;
    assert!(global.contains("count: 1"), "global config was {global}");
    Ok(())
}
