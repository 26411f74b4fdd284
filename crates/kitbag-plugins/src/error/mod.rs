//! Domain errors raised while resolving and dispatching plugin commands.
//!
//! Errors are `thiserror` enums with structured fields so callers and tests
//! can match on the failure instead of parsing messages. I/O errors are
//! wrapped in `Arc` to keep the enums cheap to clone.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kitbag_config::ConfigStoreError;
use thiserror::Error;

/// Errors raised while loading or validating a plugin manifest.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// None of the recognised manifest filenames exist.
    #[error(
        "no manifest found in '{}' (tried manifest.yaml, manifest.yml, manifest.json)",
        dir.display()
    )]
    NotFound {
        /// Plugin directory that was searched.
        dir: PathBuf,
    },

    /// The manifest file exists but could not be read.
    #[error("failed to read manifest '{}': {source}", path.display())]
    Read {
        /// Manifest file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The manifest could not be decoded.
    #[error("invalid manifest '{}': {message}", path.display())]
    Parse {
        /// Manifest file.
        path: PathBuf,
        /// Decoder diagnostic.
        message: String,
    },

    /// The manifest decoded but violates a structural rule.
    #[error("manifest validation failed: {message}")]
    Invalid {
        /// First violation found.
        message: String,
    },
}

/// Errors raised by the installed-plugin registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The registry file exists but could not be read.
    #[error("failed to read registry '{}': {source}", path.display())]
    Read {
        /// Registry file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The registry file could not be decoded.
    #[error("invalid registry '{}': {message}", path.display())]
    Parse {
        /// Registry file.
        path: PathBuf,
        /// Decoder diagnostic.
        message: String,
    },

    /// The registry could not be written.
    #[error("failed to write registry '{}': {source}", path.display())]
    Write {
        /// Registry file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Another install already uses the record's logical name.
    #[error("plugin name '{name}' is already used by install '{existing}'")]
    DuplicateName {
        /// Logical plugin name.
        name: String,
        /// Install name of the record already holding it.
        existing: String,
    },
}

/// Errors raised while mapping an identifier to a plugin directory.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No lookup tier produced an existing plugin directory.
    #[error("plugin directory not found for '{identifier}'")]
    NotFound {
        /// Identifier supplied by the caller.
        identifier: String,
    },

    /// Several installs share the logical name.
    #[error(
        "plugin name '{identifier}' is ambiguous; use one of the install names: {}",
        candidates.join(", ")
    )]
    Ambiguous {
        /// Identifier supplied by the caller.
        identifier: String,
        /// Install names declaring that logical name.
        candidates: Vec<String>,
    },

    /// The registry could not be consulted.
    #[error("cannot resolve '{identifier}': {source}")]
    Registry {
        /// Identifier supplied by the caller.
        identifier: String,
        /// Registry failure.
        #[source]
        source: RegistryError,
    },
}

/// Why a single step was considered failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    /// The process exited with a non-zero code.
    #[error("process exited with code {code}")]
    ExitCode {
        /// Exit code reported by the process.
        code: i32,
    },

    /// A stdio plugin answered with a status other than `ok`.
    #[error("plugin reported status '{status}': {message}")]
    PluginStatus {
        /// Status string from the response.
        status: String,
        /// Message from the response.
        message: String,
    },

    /// The stdio response could not be decoded.
    #[error("invalid plugin response: {message}")]
    Protocol {
        /// Decoder diagnostic.
        message: String,
    },

    /// The process could not be started.
    #[error("failed to start process: {message}")]
    Spawn {
        /// Spawn diagnostic.
        message: String,
    },
}

/// Terminal error of a dispatch.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The plugin identifier did not resolve.
    #[error(transparent)]
    PluginNotFound(#[from] ResolveError),

    /// The manifest is missing, unreadable or structurally invalid.
    #[error("plugin '{plugin}': {source}")]
    ManifestInvalid {
        /// Install name of the plugin.
        plugin: String,
        /// Manifest failure.
        #[source]
        source: ManifestError,
    },

    /// Neither a command nor a stdio entry matches the requested name.
    #[error("command '{command}' not found in plugin '{plugin}'")]
    CommandNotFound {
        /// Install name of the plugin.
        plugin: String,
        /// Requested command.
        command: String,
    },

    /// The command declares an executor other than `shell` or `stdio`.
    #[error("unsupported executor '{executor}' for command '{command}'")]
    UnsupportedExecutor {
        /// Requested command.
        command: String,
        /// Executor as written in the manifest.
        executor: String,
    },

    /// A step failed and neither its own policy nor keep-going tolerated it.
    #[error("step {index} failed: {cause}")]
    StepFailed {
        /// Zero-based step index.
        index: usize,
        /// What went wrong.
        #[source]
        cause: StepFailure,
    },

    /// The deadline expired or the dispatch was cancelled.
    #[error("dispatch canceled at step {index}: deadline exceeded")]
    Canceled {
        /// Zero-based index of the step that was running or about to run.
        index: usize,
    },

    /// Global or plugin-local configuration could not be loaded.
    #[error("failed to load configuration: {source}")]
    ConfigLoad {
        /// Store failure.
        #[source]
        source: ConfigStoreError,
    },

    /// A merged configuration could not be written back.
    #[error("failed to persist configuration mutation: {source}")]
    MutationPersist {
        /// Store failure.
        #[source]
        source: ConfigStoreError,
    },

    /// The per-run log file could not be created.
    #[error("cannot open log file '{}': {source}", path.display())]
    Log {
        /// Log file that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl DispatchError {
    /// Returns true when the dispatch stopped because of its deadline.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}

/// A [`DispatchError`] together with the per-run log file, if one was opened.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct DispatchFailure {
    #[source]
    error: DispatchError,
    log_file: Option<PathBuf>,
}

impl DispatchFailure {
    /// Pairs an error with the log file written for the run.
    #[must_use]
    pub const fn new(error: DispatchError, log_file: Option<PathBuf>) -> Self {
        Self { error, log_file }
    }

    /// Returns the terminal error.
    #[must_use]
    pub const fn error(&self) -> &DispatchError {
        &self.error
    }

    /// Returns the per-run log file for postmortem inspection.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Consumes the failure, returning the error.
    #[must_use]
    pub fn into_error(self) -> DispatchError {
        self.error
    }
}
