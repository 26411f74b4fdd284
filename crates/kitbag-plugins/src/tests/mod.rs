//! Crate-level test support, behaviour scenarios and end-to-end runs.

mod behaviour;

use std::fs;
use std::path::PathBuf;

use kitbag_config::{ConfigMap, ConfigStore, into_mapping};
use mockall::mock;
use rstest::fixture;
use serde_json::Value;
use tempfile::TempDir;

use crate::deadline::Deadline;
use crate::dispatch::Dispatcher;
use crate::dispatch_log::{DispatchLedger, DispatchLog, DispatchRecord};
use crate::executor::{ExecutionFault, ExecutionOutcome, Invocation, StepExecutor};
use crate::layout::EnvLayout;
use crate::protocol::RequestEnvelope;

mock! {
    pub Executor {}
    impl StepExecutor for Executor {
        fn execute(
            &self,
            invocation: &Invocation,
            request: &RequestEnvelope,
            log: &DispatchLog,
            deadline: &Deadline,
        ) -> Result<ExecutionOutcome, ExecutionFault>;
    }
}

/// A throwaway environment directory.
pub(crate) struct TestEnv {
    _dir: TempDir,
    layout: EnvLayout,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let layout = EnvLayout::new(dir.path());
        Self { _dir: dir, layout }
    }

    pub(crate) const fn layout(&self) -> &EnvLayout {
        &self.layout
    }

    /// Creates `plugins/<install_name>/manifest.yaml` and returns the
    /// plugin directory.
    pub(crate) fn install(&self, install_name: &str, manifest: &str) -> PathBuf {
        let dir = self.layout.plugin_dir(install_name);
        fs::create_dir_all(&dir).expect("plugin dir");
        fs::write(dir.join("manifest.yaml"), manifest).expect("write manifest");
        dir
    }

    pub(crate) fn write_global_config(&self, contents: &str) {
        fs::write(self.layout.global_config_path(), contents).expect("write global config");
    }

    pub(crate) fn global_config(&self) -> ConfigMap {
        ConfigStore::new(self.layout.global_config_path())
            .load()
            .expect("load global config")
    }

    pub(crate) fn ledger(&self) -> Vec<DispatchRecord> {
        DispatchLedger::for_layout(&self.layout)
            .records()
            .expect("read ledger")
    }

    pub(crate) fn dispatcher<E>(&self, executor: E) -> Dispatcher<E> {
        Dispatcher::new(self.layout.clone(), executor)
    }
}

#[fixture]
pub(crate) fn test_env() -> TestEnv {
    TestEnv::new()
}

pub(crate) fn map(value: Value) -> ConfigMap {
    into_mapping(value).expect("mapping")
}
