//! Merges plugin-declared mutations back into persistent configuration.
//!
//! Global mutations merge under the dispatch's strategy and are written to
//! `kitbag.yaml`. Plugin mutations always merge with
//! [`MergeStrategy::Override`] and are only honoured when the manifest
//! declares `config.local_file`; that file keeps the format implied by its
//! extension. Each write is atomic, and a failed write is fatal for the
//! dispatch.

use std::path::Path;

use kitbag_config::{ConfigStore, ConfigStoreError, MergeStrategy, merge};
use tracing::info;

use crate::layout::EnvLayout;
use crate::manifest::PluginManifest;
use crate::protocol::{ConfigSnapshot, Mutations};

const MUTATION_TARGET: &str = "kitbag_plugins::mutation";

/// Result of applying one response's mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMutations {
    snapshot: ConfigSnapshot,
    global_updated: bool,
    plugin_updated: bool,
}

impl AppliedMutations {
    /// Returns the configuration as now persisted.
    #[must_use]
    pub const fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    /// Consumes the result, returning the new snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> ConfigSnapshot {
        self.snapshot
    }

    /// Returns true when the global configuration was rewritten.
    #[must_use]
    pub const fn global_updated(&self) -> bool {
        self.global_updated
    }

    /// Returns true when the plugin-local configuration was rewritten.
    #[must_use]
    pub const fn plugin_updated(&self) -> bool {
        self.plugin_updated
    }
}

/// Configuration stores touched by one plugin's dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationApplier {
    global: ConfigStore,
    plugin: Option<ConfigStore>,
    strategy: MergeStrategy,
}

impl MutationApplier {
    /// Creates an applier over explicit stores.
    #[must_use]
    pub const fn new(global: ConfigStore, plugin: Option<ConfigStore>, strategy: MergeStrategy) -> Self {
        Self {
            global,
            plugin,
            strategy,
        }
    }

    /// Creates an applier for a plugin: the environment's `kitbag.yaml`
    /// plus the manifest's local file, resolved against `plugin_dir` unless
    /// absolute.
    #[must_use]
    pub fn for_plugin(
        layout: &EnvLayout,
        plugin_dir: &Path,
        manifest: &PluginManifest,
        strategy: MergeStrategy,
    ) -> Self {
        let plugin = manifest
            .config()
            .local_file()
            .map(|file| ConfigStore::new(plugin_dir.join(file)));
        Self::new(ConfigStore::new(layout.global_config_path()), plugin, strategy)
    }

    /// Returns the global store.
    #[must_use]
    pub const fn global_store(&self) -> &ConfigStore {
        &self.global
    }

    /// Returns the plugin-local store, if declared.
    #[must_use]
    pub const fn plugin_store(&self) -> Option<&ConfigStore> {
        self.plugin.as_ref()
    }

    /// Returns the strategy used for global mutations.
    #[must_use]
    pub const fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Loads both configurations; missing files read as empty mappings.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub fn load_snapshot(&self) -> Result<ConfigSnapshot, ConfigStoreError> {
        let global = self.global.load()?;
        let plugin = match &self.plugin {
            Some(store) => store.load()?,
            None => kitbag_config::ConfigMap::new(),
        };
        Ok(ConfigSnapshot::new(global, plugin))
    }

    /// Merges `mutations` into `snapshot` and persists every changed target.
    ///
    /// # Errors
    ///
    /// Returns the store failure of the first write that fails. A global
    /// write that already succeeded is not rolled back.
    pub fn apply(
        &self,
        mutations: &Mutations,
        snapshot: &ConfigSnapshot,
    ) -> Result<AppliedMutations, ConfigStoreError> {
        let mut global = snapshot.global().clone();
        let mut plugin = snapshot.plugin().clone();
        let mut global_updated = false;
        let mut plugin_updated = false;

        if let Some(overlay) = mutations.global() {
            global = merge(global, overlay, self.strategy);
            self.global.save(&global)?;
            global_updated = true;
            info!(
                target: MUTATION_TARGET,
                path = %self.global.path().display(),
                strategy = %self.strategy,
                "global config updated"
            );
        }

        if let (Some(overlay), Some(store)) = (mutations.plugin(), &self.plugin) {
            plugin = merge(plugin, overlay, MergeStrategy::Override);
            store.save(&plugin)?;
            plugin_updated = true;
            info!(
                target: MUTATION_TARGET,
                path = %store.path().display(),
                "plugin local config updated"
            );
        }

        Ok(AppliedMutations {
            snapshot: ConfigSnapshot::new(global, plugin),
            global_updated,
            plugin_updated,
        })
    }
}
