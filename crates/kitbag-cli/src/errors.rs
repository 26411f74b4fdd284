//! Error type for the CLI runtime.

use std::io;
use std::path::PathBuf;

use kitbag_plugins::{DispatchFailure, ManifestError, RegistryError, ResolveError};
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("{}", describe_failure(.0))]
    Dispatch(DispatchFailure),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("invalid install name '{0}'")]
    InvalidInstallName(String),
    #[error("plugin '{0}' is not installed")]
    NotInstalled(String),
    #[error("failed to remove '{}': {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
    #[error("failed to serialise registry: {0}")]
    Serialise(serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

fn describe_failure(failure: &DispatchFailure) -> String {
    failure.log_file().map_or_else(
        || failure.to_string(),
        |path| format!("{failure} (plugin log: {})", path.display()),
    )
}
