//! Plugin resolution and command dispatch for kitbag environments.
//!
//! An environment is a directory holding installed plugins under
//! `plugins/<install-name>/`, a global `kitbag.yaml`, and hidden state under
//! `.kitbag/`. Each plugin ships a manifest naming its commands. The
//! [`Dispatcher`] turns a `(plugin, command, args)` triple into one or more
//! child processes:
//!
//! 1. the [`resolver`] maps the identifier to a plugin directory using the
//!    directory name first and the [`RegistryStore`] second,
//! 2. the [`manifest`] is loaded and validated,
//! 3. each step runs through a [`StepExecutor`], either as a `shell` command
//!    line or as a `stdio` JSON request/response exchange,
//! 4. mutations returned by `stdio` plugins are merged into configuration by
//!    the [`MutationApplier`],
//! 5. every run writes a JSON Lines [`DispatchLog`] and one
//!    [`DispatchRecord`] in the environment-wide ledger.
//!
//! ```rust,no_run
//! use kitbag_plugins::{DispatchRequest, Dispatcher, EnvLayout, ProcessExecutor};
//!
//! let dispatcher = Dispatcher::new(EnvLayout::new("/srv/env"), ProcessExecutor);
//! match dispatcher.dispatch(&DispatchRequest::new("toolkit", "build")) {
//!     Ok(report) => println!("log: {}", report.log_file().display()),
//!     Err(failure) => eprintln!("{failure}"),
//! }
//! ```

pub mod deadline;
pub mod dispatch;
pub mod dispatch_log;
pub mod entry;
pub mod error;
pub mod executor;
pub mod layout;
pub mod manifest;
pub mod mutation;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod resolver;

#[cfg(test)]
mod tests;

pub use self::deadline::{CancelToken, Deadline};
pub use self::dispatch::{DispatchReport, DispatchRequest, Dispatcher, StepReport, StepStatus};
pub use self::dispatch_log::{DispatchLedger, DispatchLog, DispatchRecord, DispatchStatus, LogLevel};
pub use self::error::{
    DispatchError, DispatchFailure, ManifestError, RegistryError, ResolveError, StepFailure,
};
pub use self::executor::{ExecutionFault, ExecutionOutcome, Invocation, StepExecutor};
pub use self::layout::EnvLayout;
pub use self::manifest::{CommandSpec, ExecutorKind, PluginManifest, StepSpec};
pub use self::mutation::{AppliedMutations, MutationApplier};
pub use self::process::ProcessExecutor;
pub use self::protocol::{ConfigSnapshot, Mutations, RequestEnvelope, ResponseEnvelope};
pub use self::registry::{InstalledPlugin, Registry, RegistryStore};
pub use self::resolver::{ResolvedPlugin, is_install_name, resolve_plugin};
