//! Error types for configuration file access.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while reading or persisting a configuration file.
#[derive(Debug, Clone, Error)]
pub enum ConfigStoreError {
    /// The file exists but could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The file contents were not a valid YAML or JSON mapping.
    #[error("failed to parse config file '{path}': {message}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// The in-memory mapping could not be rendered in the store's format.
    #[error("failed to serialise config for '{path}': {message}")]
    Serialise {
        /// Destination file.
        path: PathBuf,
        /// Serialiser diagnostic.
        message: String,
    },

    /// The rendered document could not be written to disk.
    #[error("failed to write config file '{path}': {source}")]
    Write {
        /// Destination file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl ConfigStoreError {
    /// Returns the file the error relates to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Read { path, .. }
            | Self::Parse { path, .. }
            | Self::Serialise { path, .. }
            | Self::Write { path, .. } => path,
        }
    }
}
