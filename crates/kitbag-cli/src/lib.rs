//! Command-line runtime for kitbag environments.
//!
//! [`run`] parses arguments, installs diagnostic logging, and executes one
//! of the subcommands:
//!
//! - `run PLUGIN COMMAND [-- ARGS...]` dispatches a plugin command and
//!   prints the plugin's logs, artifacts and log file,
//! - `plugin list`, `plugin info` and `plugin remove` inspect and manage the
//!   environment's installed plugins.
//!
//! Failures are reported as a single line on stderr.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod errors;
mod output;
mod telemetry;

use cli::{Cli, CliCommand, PluginAction};
use errors::AppError;

/// Runs the CLI with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            drop(write!(stderr, "{error}"));
            return ExitCode::FAILURE;
        }
        Err(error) => {
            drop(write!(stdout, "{error}"));
            return ExitCode::SUCCESS;
        }
    };

    match execute(cli, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            drop(writeln!(stderr, "{error}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write>(cli: Cli, stdout: &mut W) -> Result<(), AppError> {
    telemetry::initialise(&cli.log_filter, cli.log_format)?;
    let env_dir = cli.env_dir;
    match cli.command {
        CliCommand::Run(args) => commands::run_plugin(&env_dir, args, stdout),
        CliCommand::Plugin { action } => match action {
            PluginAction::List { json } => commands::list_plugins(&env_dir, json, stdout),
            PluginAction::Info { name } => commands::plugin_info(&env_dir, &name, stdout),
            PluginAction::Remove { install_name } => {
                commands::remove_plugin(&env_dir, &install_name, stdout)
            }
        },
    }
}

#[cfg(test)]
mod tests;
