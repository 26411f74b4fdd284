//! Plugin manifest model and validator.
//!
//! A manifest lives at the root of the plugin directory as `manifest.yaml`,
//! `manifest.yml` or `manifest.json` (first match wins). Loading and
//! validation are separate: [`PluginManifest::load`] only decodes, while
//! [`PluginManifest::validate`] enforces the structural rules and stops at
//! the first violation.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ManifestError;

/// Manifest filenames in lookup order.
pub const MANIFEST_CANDIDATES: [&str; 3] = ["manifest.yaml", "manifest.yml", "manifest.json"];

/// Execution strategy of a command or step.
///
/// Parsing ignores ASCII case, so `Shell` and `STDIO` are accepted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExecutorKind {
    /// Command line run through the system shell.
    Shell,
    /// JSON request on stdin, JSON response on stdout.
    Stdio,
}

impl ExecutorKind {
    /// Parses a manifest executor value, returning `None` when unsupported.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

/// Single-command shortcut declared at the top level of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntrySpec {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    args: Vec<String>,
}

impl EntrySpec {
    /// Returns the declared entry type (`stdio` is the only one dispatched).
    #[must_use]
    pub const fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Returns the entry program path.
    #[must_use]
    pub const fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the default arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn is_stdio(&self) -> bool {
        ExecutorKind::parse(&self.kind) == Some(ExecutorKind::Stdio)
    }

    fn is_dispatchable(&self) -> bool {
        !self.path.trim().is_empty() && self.is_stdio()
    }
}

/// Plugin-local configuration declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSpec {
    namespace: String,
    #[serde(alias = "localFile")]
    local_file: String,
    #[serde(alias = "stateFile")]
    state_file: String,
}

impl ConfigSpec {
    /// Returns the configuration namespace.
    #[must_use]
    pub const fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns the plugin-local config file, when declared.
    #[must_use]
    pub fn local_file(&self) -> Option<&str> {
        non_blank(&self.local_file)
    }

    /// Returns the plugin state file, when declared.
    #[must_use]
    pub fn state_file(&self) -> Option<&str> {
        non_blank(&self.state_file)
    }
}

/// One step of a multi-step command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSpec {
    executor: String,
    program: String,
    args: Vec<String>,
    workdir: String,
    env: BTreeMap<String, String>,
    #[serde(alias = "continueOnError")]
    continue_on_error: bool,
}

impl StepSpec {
    /// Returns the executor as written in the manifest.
    #[must_use]
    pub const fn executor(&self) -> &str {
        self.executor.as_str()
    }

    /// Returns the parsed executor, if supported.
    #[must_use]
    pub fn executor_kind(&self) -> Option<ExecutorKind> {
        ExecutorKind::parse(&self.executor)
    }

    /// Returns the program (command line for shell, entry path for stdio).
    #[must_use]
    pub const fn program(&self) -> &str {
        self.program.as_str()
    }

    /// Returns the declared arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory, relative to the plugin unless absolute.
    #[must_use]
    pub const fn workdir(&self) -> &str {
        self.workdir.as_str()
    }

    /// Returns extra environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns true when a failure of this step must not abort the command.
    #[must_use]
    pub const fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }
}

/// A named command exposed by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSpec {
    name: String,
    summary: String,
    executor: String,
    program: String,
    args: Vec<String>,
    workdir: String,
    env: BTreeMap<String, String>,
    #[serde(alias = "useStdio")]
    use_stdio: bool,
    #[serde(alias = "logCapture")]
    log_capture: bool,
    steps: Vec<StepSpec>,
}

impl CommandSpec {
    /// Returns the command name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the one-line summary.
    #[must_use]
    pub const fn summary(&self) -> &str {
        self.summary.as_str()
    }

    /// Returns the executor as written in the manifest.
    #[must_use]
    pub const fn executor(&self) -> &str {
        self.executor.as_str()
    }

    /// Returns the parsed executor, if supported.
    #[must_use]
    pub fn executor_kind(&self) -> Option<ExecutorKind> {
        ExecutorKind::parse(&self.executor)
    }

    /// Returns the program (command line for shell, entry path for stdio).
    #[must_use]
    pub const fn program(&self) -> &str {
        self.program.as_str()
    }

    /// Returns the declared arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory, relative to the plugin unless absolute.
    #[must_use]
    pub const fn workdir(&self) -> &str {
        self.workdir.as_str()
    }

    /// Returns extra environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the `use_stdio` flag.
    #[must_use]
    pub const fn use_stdio(&self) -> bool {
        self.use_stdio
    }

    /// Returns the `log_capture` flag.
    #[must_use]
    pub const fn log_capture(&self) -> bool {
        self.log_capture
    }

    /// Returns the ordered steps; empty for single-command specs.
    #[must_use]
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    fn from_entry(name: &str, entry: &EntrySpec) -> Self {
        Self {
            name: name.to_owned(),
            executor: entry.kind.clone(),
            program: entry.path.clone(),
            args: entry.args.clone(),
            use_stdio: true,
            log_capture: true,
            ..Self::default()
        }
    }
}

/// Decoded plugin manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginManifest {
    name: String,
    version: String,
    entry: Option<EntrySpec>,
    config: ConfigSpec,
    commands: Vec<CommandSpec>,
    expose: Vec<String>,
}

impl PluginManifest {
    /// Returns the path of the first manifest candidate present in `plugin_dir`.
    #[must_use]
    pub fn locate(plugin_dir: &Path) -> Option<PathBuf> {
        MANIFEST_CANDIDATES
            .iter()
            .map(|candidate| plugin_dir.join(candidate))
            .find(|path| path.is_file())
    }

    /// Loads the manifest from `plugin_dir` without validating it.
    ///
    /// A missing `name` is filled in from the directory's basename.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotFound`] when no candidate file exists,
    /// [`ManifestError::Read`] when it cannot be read and
    /// [`ManifestError::Parse`] when it cannot be decoded.
    pub fn load(plugin_dir: &Path) -> Result<Self, ManifestError> {
        let path = Self::locate(plugin_dir).ok_or_else(|| ManifestError::NotFound {
            dir: plugin_dir.to_path_buf(),
        })?;
        let contents = fs::read_to_string(&path).map_err(|error| read_error(&path, error))?;
        let mut manifest = Self::parse(&path, &contents)?;
        if manifest.name.trim().is_empty() {
            if let Some(base) = plugin_dir.file_name().and_then(|name| name.to_str()) {
                base.clone_into(&mut manifest.name);
            }
        }
        Ok(manifest)
    }

    /// Decodes manifest text, choosing JSON for a `.json` path and YAML
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] when decoding fails.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ManifestError> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let decoded = if is_json {
            serde_json::from_str(contents).map_err(|error| error.to_string())
        } else if contents.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_yaml::from_str(contents).map_err(|error| error.to_string())
        };
        decoded.map_err(|message| ManifestError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Checks the structural rules, failing on the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Invalid`] describing the violation.
    pub fn validate(&self) -> Result<(), ManifestError> {
        require(!self.name.trim().is_empty(), || "'name' is required".to_owned())?;
        require(!self.version.trim().is_empty(), || {
            "'version' is required".to_owned()
        })?;
        require(!self.expose.is_empty(), || {
            "'expose' must have at least one alias".to_owned()
        })?;
        for (index, alias) in self.expose.iter().enumerate() {
            require(is_valid_alias(alias), || {
                format!("expose[{index}] '{alias}' must be non-empty and use only letters, digits, '-' or '_'")
            })?;
        }

        if self.commands.is_empty() {
            let entry = self.entry.as_ref();
            require(entry.is_some_and(|e| !e.path.trim().is_empty()), || {
                "either 'commands' or 'entry.path' must be provided".to_owned()
            })?;
            require(entry.is_some_and(EntrySpec::is_stdio), || {
                "entry.type must be 'stdio' when commands are empty".to_owned()
            })?;
            return Ok(());
        }

        let mut seen = HashSet::new();
        for (index, command) in self.commands.iter().enumerate() {
            require(!command.name.trim().is_empty(), || {
                format!("commands[{index}].name is required")
            })?;
            require(seen.insert(command.name.as_str()), || {
                format!("duplicate command name '{}'", command.name)
            })?;
            require(
                !command.program.trim().is_empty() || !command.steps.is_empty(),
                || format!("commands[{index}] must declare 'program' or 'steps'"),
            )?;
            for (step_index, step) in command.steps.iter().enumerate() {
                require(step.executor_kind().is_some(), || {
                    format!("commands[{index}].steps[{step_index}].executor must be 'shell' or 'stdio'")
                })?;
                require(!step.program.trim().is_empty(), || {
                    format!("commands[{index}].steps[{step_index}].program is required")
                })?;
            }
        }
        Ok(())
    }

    /// Returns the plugin's logical name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the top-level entry, if declared.
    #[must_use]
    pub const fn entry(&self) -> Option<&EntrySpec> {
        self.entry.as_ref()
    }

    /// Returns the plugin-local configuration declaration.
    #[must_use]
    pub const fn config(&self) -> &ConfigSpec {
        &self.config
    }

    /// Returns the declared commands in manifest order.
    #[must_use]
    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// Returns the exposed shim aliases.
    #[must_use]
    pub fn expose(&self) -> &[String] {
        &self.expose
    }

    /// Finds a declared command by exact name.
    #[must_use]
    pub fn find_command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|command| command.name == name)
    }

    /// Finds a declared command, falling back to a command synthesised from
    /// a `stdio` entry.
    #[must_use]
    pub fn resolve_command(&self, name: &str) -> Option<Cow<'_, CommandSpec>> {
        if let Some(command) = self.find_command(name) {
            return Some(Cow::Borrowed(command));
        }
        self.entry
            .as_ref()
            .filter(|entry| entry.is_dispatchable())
            .map(|entry| Cow::Owned(CommandSpec::from_entry(name, entry)))
    }
}

fn require(condition: bool, message: impl FnOnce() -> String) -> Result<(), ManifestError> {
    if condition {
        Ok(())
    } else {
        Err(ManifestError::Invalid { message: message() })
    }
}

fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty()
        && alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn read_error(path: &Path, error: io::Error) -> ManifestError {
    ManifestError::Read {
        path: path.to_path_buf(),
        source: Arc::new(error),
    }
}
