//! Envelopes exchanged with `stdio` plugins.
//!
//! The dispatcher writes one [`RequestEnvelope`] as JSON to the plugin's
//! stdin and closes it; the plugin answers with one [`ResponseEnvelope`] on
//! stdout. Response decoding is lenient about shapes the dispatcher does not
//! act on: non-string log entries are rendered as JSON text and mutation
//! targets that are not mappings are ignored.

use std::path::{Path, PathBuf};

use kitbag_config::{ConfigMap, ConfigValue, MergeStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Absolute environment paths handed to the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPaths {
    home: PathBuf,
    bin: PathBuf,
    workspace: PathBuf,
    plugin_dir: PathBuf,
}

impl RequestPaths {
    /// Groups the environment paths.
    #[must_use]
    pub const fn new(home: PathBuf, bin: PathBuf, workspace: PathBuf, plugin_dir: PathBuf) -> Self {
        Self {
            home,
            bin,
            workspace,
            plugin_dir,
        }
    }

    /// Returns the environment root.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Returns the shim directory.
    #[must_use]
    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Returns the shared workspace directory.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns the plugin directory.
    #[must_use]
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }
}

/// Host operating system and architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    os: String,
    arch: String,
}

impl SystemInfo {
    /// Describes the running host.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
        }
    }

    /// Returns the operating system name.
    #[must_use]
    pub const fn os(&self) -> &str {
        self.os.as_str()
    }

    /// Returns the CPU architecture.
    #[must_use]
    pub const fn arch(&self) -> &str {
        self.arch.as_str()
    }
}

/// Global and plugin-local configuration as currently persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    global: ConfigMap,
    plugin: ConfigMap,
}

impl ConfigSnapshot {
    /// Pairs the two configuration mappings.
    #[must_use]
    pub const fn new(global: ConfigMap, plugin: ConfigMap) -> Self {
        Self { global, plugin }
    }

    /// Returns the global configuration.
    #[must_use]
    pub const fn global(&self) -> &ConfigMap {
        &self.global
    }

    /// Returns the plugin-local configuration.
    #[must_use]
    pub const fn plugin(&self) -> &ConfigMap {
        &self.plugin
    }
}

/// Request written to a `stdio` plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    action: String,
    args: Vec<String>,
    paths: RequestPaths,
    system: SystemInfo,
    config: ConfigSnapshot,
    merge_strategy: MergeStrategy,
    started_at: String,
}

impl RequestEnvelope {
    /// Builds a request for `action`, stamped with the current UTC time.
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        args: Vec<String>,
        paths: RequestPaths,
        config: ConfigSnapshot,
        merge_strategy: MergeStrategy,
    ) -> Self {
        Self {
            action: action.into(),
            args,
            paths,
            system: SystemInfo::current(),
            config,
            merge_strategy,
            started_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        }
    }

    /// Replaces the configuration snapshot.
    #[must_use]
    pub fn with_config(mut self, config: ConfigSnapshot) -> Self {
        self.config = config;
        self
    }

    /// Returns the command name.
    #[must_use]
    pub const fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Returns the pass-through arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the environment paths.
    #[must_use]
    pub const fn paths(&self) -> &RequestPaths {
        &self.paths
    }

    /// Returns the host description.
    #[must_use]
    pub const fn system(&self) -> &SystemInfo {
        &self.system
    }

    /// Returns the configuration snapshot.
    #[must_use]
    pub const fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    /// Returns the caller's merge strategy.
    #[must_use]
    pub const fn merge_strategy(&self) -> MergeStrategy {
        self.merge_strategy
    }

    /// Returns the RFC 3339 dispatch start time.
    #[must_use]
    pub const fn started_at(&self) -> &str {
        self.started_at.as_str()
    }
}

/// Configuration fragments a plugin asks to merge back.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Mutations {
    #[serde(skip_serializing_if = "Option::is_none")]
    global: Option<ConfigMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin: Option<ConfigMap>,
}

impl Mutations {
    /// Creates a mutation set.
    #[must_use]
    pub const fn new(global: Option<ConfigMap>, plugin: Option<ConfigMap>) -> Self {
        Self { global, plugin }
    }

    /// Returns the fragment for the global configuration.
    #[must_use]
    pub const fn global(&self) -> Option<&ConfigMap> {
        self.global.as_ref()
    }

    /// Returns the fragment for the plugin-local configuration.
    #[must_use]
    pub const fn plugin(&self) -> Option<&ConfigMap> {
        self.plugin.as_ref()
    }

    /// Returns true when neither target carries a fragment.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.global.is_none() && self.plugin.is_none()
    }

    fn from_value(value: ConfigValue) -> Option<Self> {
        let ConfigValue::Object(mut targets) = value else {
            return None;
        };
        let mut take = |key: &str| match targets.remove(key) {
            Some(ConfigValue::Object(map)) => Some(map),
            _ => None,
        };
        let global = take("global");
        let plugin = take("plugin");
        Some(Self { global, plugin })
    }
}

impl<'de> Deserialize<'de> for Mutations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = ConfigValue::deserialize(deserializer)?;
        Ok(Self::from_value(value).unwrap_or_default())
    }
}

/// Response read from a `stdio` plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, deserialize_with = "lenient_text")]
    status: String,
    #[serde(default, deserialize_with = "lenient_text")]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mutations: Option<Mutations>,
    #[serde(default, deserialize_with = "lenient_lines")]
    logs: Vec<String>,
    #[serde(default, deserialize_with = "lenient_lines")]
    artifacts: Vec<String>,
}

impl ResponseEnvelope {
    /// Status value signalling success.
    pub const OK: &'static str = "ok";

    /// Creates a successful response.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: Self::OK.to_owned(),
            ..Self::default()
        }
    }

    /// Creates an error response carrying `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: String::from("error"),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attaches mutations.
    #[must_use]
    pub fn with_mutations(mut self, mutations: Mutations) -> Self {
        self.mutations = Some(mutations);
        self
    }

    /// Attaches log lines.
    #[must_use]
    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    /// Attaches artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Returns true only for status `ok`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Self::OK
    }

    /// Returns the raw status.
    #[must_use]
    pub const fn status(&self) -> &str {
        self.status.as_str()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Returns the requested mutations.
    #[must_use]
    pub const fn mutations(&self) -> Option<&Mutations> {
        self.mutations.as_ref()
    }

    /// Returns the log lines to echo.
    #[must_use]
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Returns the reported artifacts.
    #[must_use]
    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }
}

fn render(value: ConfigValue) -> String {
    match value {
        ConfigValue::Null => String::new(),
        ConfigValue::String(text) => text,
        other => other.to_string(),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(render(ConfigValue::deserialize(deserializer)?))
}

fn lenient_lines<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match ConfigValue::deserialize(deserializer)? {
        ConfigValue::Null => Vec::new(),
        ConfigValue::Array(items) => items.into_iter().map(render).collect(),
        single => vec![render(single)],
    })
}
