//! Unit tests for the installed-plugin registry.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;
use time::macros::datetime;

use super::*;

#[fixture]
fn env_dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn record(name: &str, install_name: &str) -> InstalledPlugin {
    InstalledPlugin::new(name, install_name, "1.0.0")
        .with_installed_at(datetime!(2024-05-01 12:00 UTC))
}

#[rstest]
fn missing_registry_is_empty(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    assert!(store.load().expect("load").is_empty());
    assert!(store.path().ends_with(".kitbag/registry/installed.yaml"));
}

#[rstest]
fn register_persists_and_reloads(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    let entry = record("toolkit", "toolkit")
        .with_source("https://example.com/toolkit.git")
        .with_reference("v1")
        .with_shims(vec![String::from("tk")]);
    store.register(entry.clone()).expect("register");

    let loaded = store.get_by_install_name("toolkit").expect("load");
    assert_eq!(loaded, Some(entry));
    let text = fs::read_to_string(store.path()).expect("read");
    assert!(text.contains("install_name: toolkit"));
    assert!(text.contains("ref: v1"));
}

#[rstest]
fn register_replaces_same_install_name(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    store.register(record("toolkit", "tk")).expect("first");
    store
        .register(InstalledPlugin::new("toolkit", "tk", "2.0.0"))
        .expect("update");
    let registry = store.load().expect("load");
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.plugins()[0].version(), "2.0.0");
}

#[rstest]
fn register_rejects_logical_name_held_by_other_install(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    store.register(record("fmt", "fmt-a")).expect("first");
    let err = store.register(record("fmt", "fmt-b")).expect_err("duplicate");
    assert!(matches!(
        err,
        RegistryError::DuplicateName { ref name, ref existing } if name == "fmt" && existing == "fmt-a"
    ));
}

#[rstest]
fn unregister_reports_whether_anything_was_removed(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    store.register(record("a", "a")).expect("register a");
    store.register(record("b", "b")).expect("register b");
    assert!(store.unregister("a").expect("unregister"));
    assert!(!store.unregister("a").expect("second unregister"));
    let names: Vec<String> = store
        .load()
        .expect("load")
        .plugins()
        .iter()
        .map(|p| p.install_name().to_owned())
        .collect();
    assert_eq!(names, ["b"]);
}

#[rstest]
fn find_by_name_matches_logical_names(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    store.register(record("formatter", "fmt-v2")).expect("register");
    let found = store.find_by_name("formatter").expect("find");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].install_name(), "fmt-v2");
    assert!(store.find_by_name("fmt-v2").expect("find").is_empty());
}

#[rstest]
fn hand_written_registry_with_duplicates_is_loaded(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
    fs::write(
        store.path(),
        "plugins:\n  - name: x\n    install_name: x1\n    installed_at: 2024-01-01T00:00:00Z\n  - name: x\n    installName: x2\n    installed_at: 2024-01-02T00:00:00Z\n",
    )
    .expect("write");
    let registry = store.load().expect("load");
    assert_eq!(registry.find_by_name("x").len(), 2);
}

#[rstest]
fn malformed_registry_is_parse_error(env_dir: TempDir) {
    let store = RegistryStore::new(env_dir.path());
    fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
    fs::write(store.path(), "plugins: [ {name: ").expect("write");
    assert!(matches!(store.load(), Err(RegistryError::Parse { .. })));
}

#[test]
fn from_manifest_copies_identity_and_shims() {
    let manifest = PluginManifest::parse(
        Path::new("manifest.yaml"),
        "name: toolkit\nversion: '3.1'\nexpose: [tk, tkb]\ncommands: [{name: b, program: make}]\n",
    )
    .expect("parse");
    let entry = InstalledPlugin::from_manifest(&manifest, "toolkit-main", "git+https://x", "main");
    assert_eq!(entry.name(), "toolkit");
    assert_eq!(entry.install_name(), "toolkit-main");
    assert_eq!(entry.version(), "3.1");
    assert_eq!(entry.source(), "git+https://x");
    assert_eq!(entry.reference(), "main");
    assert_eq!(entry.shims(), ["tk", "tkb"]);
}
