//! Fixed filesystem layout of an environment directory.

use std::path::{Path, PathBuf};

/// Global configuration file, relative to the environment root.
pub const GLOBAL_CONFIG_FILE: &str = "kitbag.yaml";
/// Directory holding one sub-directory per installed plugin.
pub const PLUGINS_DIR: &str = "plugins";
/// Directory receiving exposed shims.
pub const BIN_DIR: &str = "bin";
/// Scratch directory shared by plugins.
pub const WORKSPACE_DIR: &str = "workspace";
/// Hidden state directory.
pub const STATE_DIR: &str = ".kitbag";

/// Paths derived from an environment root.
///
/// The root is made absolute on construction so every derived path can be
/// handed to child processes unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLayout {
    root: PathBuf,
}

impl EnvLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self { root }
    }

    /// Returns the environment root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory containing installed plugins.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join(PLUGINS_DIR)
    }

    /// Returns the directory of the plugin installed as `install_name`.
    #[must_use]
    pub fn plugin_dir(&self, install_name: &str) -> PathBuf {
        self.plugins_dir().join(install_name)
    }

    /// Returns the shim directory.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    /// Returns the shared workspace directory.
    #[must_use]
    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    /// Returns the global configuration file.
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.root.join(GLOBAL_CONFIG_FILE)
    }

    /// Returns the installed-plugin registry file.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join("registry").join("installed.yaml")
    }

    /// Returns the environment-wide dispatch ledger.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join("logs").join("dispatch.log")
    }
}
