//! Subcommand implementations.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use kitbag_plugins::{
    Deadline, DispatchRequest, Dispatcher, EnvLayout, PluginManifest, ProcessExecutor,
    RegistryStore, is_install_name, resolve_plugin,
};
use tracing::info;

use crate::cli::RunArgs;
use crate::errors::AppError;
use crate::output;

const CLI_TARGET: &str = "kitbag_cli::commands";

/// `kitbag run`.
pub(crate) fn run_plugin<W: Write>(env_dir: &Path, args: RunArgs, stdout: &mut W) -> Result<(), AppError> {
    let deadline = args
        .timeout
        .filter(|secs| *secs > 0)
        .map_or_else(Deadline::none, |secs| Deadline::after(Duration::from_secs(secs)));
    let request = DispatchRequest::new(args.plugin, args.command)
        .with_args(args.args)
        .with_strategy(args.merge)
        .with_keep_going(args.keep_going)
        .with_deadline(deadline);

    let dispatcher = Dispatcher::new(EnvLayout::new(env_dir), ProcessExecutor);
    let report = dispatcher.dispatch(&request).map_err(AppError::Dispatch)?;
    output::render_report(&report, stdout)?;
    Ok(())
}

/// `kitbag plugin list`.
pub(crate) fn list_plugins<W: Write>(env_dir: &Path, json: bool, stdout: &mut W) -> Result<(), AppError> {
    let registry = RegistryStore::new(env_dir).load()?;
    if json {
        let rendered =
            serde_json::to_string_pretty(registry.plugins()).map_err(AppError::Serialise)?;
        writeln!(stdout, "{rendered}")?;
    } else {
        output::render_registry(registry.plugins(), stdout)?;
    }
    Ok(())
}

/// `kitbag plugin info`.
pub(crate) fn plugin_info<W: Write>(env_dir: &Path, name: &str, stdout: &mut W) -> Result<(), AppError> {
    let layout = EnvLayout::new(env_dir);
    let registry = RegistryStore::for_layout(&layout);
    let resolved = resolve_plugin(&layout, &registry, name)?;
    let manifest = PluginManifest::load(resolved.dir())?;
    let record = registry.get_by_install_name(resolved.install_name())?;
    output::render_info(&resolved, &manifest, record.as_ref(), stdout)?;
    Ok(())
}

/// `kitbag plugin remove`.
pub(crate) fn remove_plugin<W: Write>(
    env_dir: &Path,
    install_name: &str,
    stdout: &mut W,
) -> Result<(), AppError> {
    if !is_install_name(install_name) {
        return Err(AppError::InvalidInstallName(install_name.to_owned()));
    }
    let layout = EnvLayout::new(env_dir);
    let dir = layout.plugin_dir(install_name);
    let removed_dir = match fs::remove_dir_all(&dir) {
        Ok(()) => true,
        Err(error) if error.kind() == io::ErrorKind::NotFound => false,
        Err(source) => return Err(AppError::Remove { path: dir, source }),
    };
    let removed_record = RegistryStore::for_layout(&layout).unregister(install_name)?;
    if !removed_dir && !removed_record {
        return Err(AppError::NotInstalled(install_name.to_owned()));
    }
    info!(
        target: CLI_TARGET,
        install_name,
        removed_dir,
        removed_record,
        "plugin removed"
    );
    writeln!(stdout, "Removed {install_name}")?;
    Ok(())
}
