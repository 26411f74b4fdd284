use crate::logging::LogFormat;

/// Default log filter expression used by the CLI.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Default diagnostic logging format for the CLI.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
