//! Command-line argument definitions for `kitbag`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kitbag_config::{DEFAULT_LOG_FILTER, LogFormat, MergeStrategy, default_log_format};

/// Runs commands from plugins installed in a kitbag environment.
#[derive(Parser, Debug)]
#[command(name = "kitbag", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Root of the environment to operate on.
    #[arg(
        long,
        env = "KITBAG_ENV_DIR",
        default_value = ".",
        value_name = "DIR",
        global = true
    )]
    pub(crate) env_dir: PathBuf,
    /// Tracing filter for diagnostics written to stderr.
    #[arg(
        long,
        env = "KITBAG_LOG_FILTER",
        default_value = DEFAULT_LOG_FILTER,
        value_name = "FILTER",
        global = true
    )]
    pub(crate) log_filter: String,
    /// Diagnostic log format (`compact` or `json`).
    #[arg(
        long,
        env = "KITBAG_LOG_FORMAT",
        default_value_t = default_log_format(),
        value_name = "FORMAT",
        global = true
    )]
    pub(crate) log_format: LogFormat,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Top-level operations.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Runs a plugin command.
    Run(RunArgs),
    /// Inspects and removes installed plugins.
    Plugin {
        /// The plugin action to perform.
        #[command(subcommand)]
        action: PluginAction,
    },
}

/// Arguments of `kitbag run`.
#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// Install name or logical name of the plugin.
    #[arg(value_name = "PLUGIN")]
    pub(crate) plugin: String,
    /// Command declared in the plugin manifest.
    #[arg(value_name = "COMMAND")]
    pub(crate) command: String,
    /// How global configuration mutations are merged.
    #[arg(long, value_name = "STRATEGY", default_value_t = MergeStrategy::Override)]
    pub(crate) merge: MergeStrategy,
    /// Continues multi-step commands past failed steps.
    #[arg(long)]
    pub(crate) keep_going: bool,
    /// Cancels the dispatch after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    /// Arguments passed through to the plugin.
    #[arg(value_name = "ARG", last = true)]
    pub(crate) args: Vec<String>,
}

/// Plugin management actions.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum PluginAction {
    /// Lists registry records.
    List {
        /// Prints the records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Shows the manifest of an installed plugin.
    Info {
        /// Install name or logical name of the plugin.
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Deletes a plugin directory and its registry record.
    Remove {
        /// Directory name under `plugins/`.
        #[arg(value_name = "INSTALL_NAME")]
        install_name: String,
    },
}
