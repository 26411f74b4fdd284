//! Human-readable rendering of command results.

use std::io::{self, Write};

use kitbag_plugins::{DispatchReport, InstalledPlugin, PluginManifest, ResolvedPlugin};
use time::format_description::well_known::Rfc3339;

/// Prints plugin logs, artifacts and the log file of a finished run.
pub(crate) fn render_report<W: Write>(report: &DispatchReport, out: &mut W) -> io::Result<()> {
    for line in report.logs() {
        writeln!(out, "{line}")?;
    }
    for artifact in report.artifacts() {
        writeln!(out, "Artifact: {artifact}")?;
    }
    writeln!(out, "Plugin log: {}", report.log_file().display())
}

/// Prints one tab-separated line per registry record.
pub(crate) fn render_registry<W: Write>(plugins: &[InstalledPlugin], out: &mut W) -> io::Result<()> {
    if plugins.is_empty() {
        return writeln!(out, "No plugins installed.");
    }
    writeln!(out, "INSTALL\tNAME\tVERSION\tSOURCE")?;
    for plugin in plugins {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            plugin.install_name(),
            plugin.name(),
            plugin.version(),
            plugin.source()
        )?;
    }
    Ok(())
}

/// Prints a plugin's manifest summary.
pub(crate) fn render_info<W: Write>(
    resolved: &ResolvedPlugin,
    manifest: &PluginManifest,
    record: Option<&InstalledPlugin>,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "Name: {}", manifest.name())?;
    writeln!(out, "Version: {}", manifest.version())?;
    writeln!(out, "Install: {}", resolved.install_name())?;
    writeln!(out, "Directory: {}", resolved.dir().display())?;
    if let Some(record) = record {
        if !record.source().is_empty() {
            writeln!(out, "Source: {}", record.source())?;
        }
        if let Ok(installed_at) = record.installed_at().format(&Rfc3339) {
            writeln!(out, "Installed: {installed_at}")?;
        }
    }

    writeln!(out, "Commands:")?;
    for command in manifest.commands() {
        let executor = if command.steps().is_empty() {
            command.executor().to_owned()
        } else {
            format!("{} steps", command.steps().len())
        };
        writeln!(out, "  {}\t{}\t{}", command.name(), executor, command.summary())?;
    }
    if manifest.commands().is_empty()
        && let Some(entry) = manifest.entry()
    {
        writeln!(out, "  *\t{}\t{}", entry.kind(), entry.path())?;
    }

    let shims = record
        .map(InstalledPlugin::shims)
        .filter(|shims| !shims.is_empty())
        .unwrap_or_else(|| manifest.expose());
    writeln!(out, "Shims: {}", shims.join(", "))
}
