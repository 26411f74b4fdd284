//! Unit tests for plugin resolution.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::registry::InstalledPlugin;

struct Env {
    _dir: TempDir,
    layout: EnvLayout,
    registry: RegistryStore,
}

impl Env {
    fn install_dir(&self, install_name: &str) {
        fs::create_dir_all(self.layout.plugin_dir(install_name)).expect("plugin dir");
    }

    fn register(&self, name: &str, install_name: &str) {
        self.registry
            .register(InstalledPlugin::new(name, install_name, "1.0"))
            .expect("register");
    }
}

#[fixture]
fn env() -> Env {
    let dir = TempDir::new().expect("temp dir");
    let layout = EnvLayout::new(dir.path());
    let registry = RegistryStore::for_layout(&layout);
    Env {
        _dir: dir,
        layout,
        registry,
    }
}

#[rstest]
fn install_directory_resolves_with_empty_registry(env: Env) {
    env.install_dir("toolkit");
    let resolved = resolve_plugin(&env.layout, &env.registry, "toolkit").expect("resolve");
    assert_eq!(resolved.install_name(), "toolkit");
    assert_eq!(resolved.dir(), env.layout.plugin_dir("toolkit"));
}

#[rstest]
fn logical_name_resolves_through_registry(env: Env) {
    env.install_dir("toolkit-v2");
    env.register("toolkit", "toolkit-v2");
    let resolved = resolve_plugin(&env.layout, &env.registry, "toolkit").expect("resolve");
    assert_eq!(resolved.install_name(), "toolkit-v2");
}

#[rstest]
fn registry_record_without_directory_is_skipped(env: Env) {
    env.register("toolkit", "gone");
    let err = resolve_plugin(&env.layout, &env.registry, "toolkit").expect_err("missing dir");
    assert!(matches!(err, ResolveError::NotFound { .. }));
}

#[rstest]
fn install_directory_beats_logical_name(env: Env) {
    env.install_dir("fmt");
    env.install_dir("other");
    env.register("fmt", "other");
    let resolved = resolve_plugin(&env.layout, &env.registry, "fmt").expect("resolve");
    assert_eq!(resolved.install_name(), "fmt");
}

#[rstest]
fn shared_logical_name_is_ambiguous(env: Env) {
    env.install_dir("fmt-a");
    env.install_dir("fmt-b");
    let path = env.registry.path().to_path_buf();
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(
        &path,
        "plugins:\n  - {name: fmt, install_name: fmt-a, installed_at: 2024-01-01T00:00:00Z}\n  - {name: fmt, install_name: fmt-b, installed_at: 2024-01-01T00:00:00Z}\n",
    )
    .expect("write registry");
    let err = resolve_plugin(&env.layout, &env.registry, "fmt").expect_err("ambiguous");
    match err {
        ResolveError::Ambiguous { candidates, .. } => assert_eq!(candidates, ["fmt-a", "fmt-b"]),
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[rstest]
#[case::empty("")]
#[case::dot(".")]
#[case::parent("..")]
#[case::nested("../plugins")]
#[case::separator("a/b")]
fn path_like_identifiers_do_not_resolve(env: Env, #[case] identifier: &str) {
    env.install_dir("a");
    fs::create_dir_all(env.layout.plugin_dir("a").join("b")).expect("nested dir");
    let err = resolve_plugin(&env.layout, &env.registry, identifier).expect_err("rejected");
    assert!(matches!(err, ResolveError::NotFound { .. }), "{err:?}");
}

#[rstest]
fn corrupt_registry_only_matters_after_tier_one(env: Env) {
    env.install_dir("direct");
    let path = env.registry.path().to_path_buf();
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "plugins: [").expect("write");
    resolve_plugin(&env.layout, &env.registry, "direct").expect("tier one");
    let err = resolve_plugin(&env.layout, &env.registry, "elsewhere").expect_err("registry");
    assert!(matches!(err, ResolveError::Registry { .. }));
}
