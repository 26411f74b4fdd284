//! Per-run JSON Lines log and the environment-wide dispatch ledger.
//!
//! Each dispatch writes `<plugin>/logs/<UTC date>/<command>-<UTC stamp>.log`,
//! one JSON object per line with `ts`, `level` and `message` plus event
//! fields. Lines are flushed as they are written. The ledger at
//! `.kitbag/logs/dispatch.log` receives one [`DispatchRecord`] per top-level
//! dispatch.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kitbag_config::ConfigMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::warn;

use crate::layout::EnvLayout;

const LOG_TARGET: &str = "kitbag_plugins::dispatch_log";

/// Level tag of a dispatch log line. Captured process output is tagged with
/// the stream it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogLevel {
    /// Spawn and protocol detail.
    Debug,
    /// Progress events.
    Info,
    /// Tolerated failures.
    Warn,
    /// Fatal failures.
    Error,
    /// A line the child wrote to stdout.
    Stdout,
    /// A line the child wrote to stderr.
    Stderr,
}

/// Append-only JSON Lines log for one dispatch. Clones share the file.
#[derive(Debug, Clone)]
pub struct DispatchLog {
    path: PathBuf,
    sink: Arc<Mutex<File>>,
}

impl DispatchLog {
    /// Creates the log file for `command` under `plugin_dir/logs/`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while creating the directory or file.
    pub fn create(plugin_dir: &Path, command: &str) -> io::Result<Self> {
        Self::create_at(plugin_dir, command, OffsetDateTime::now_utc())
    }

    /// Creates the log file named after the supplied UTC time.
    ///
    /// # Errors
    ///
    /// Returns any error raised while creating the directory or file.
    pub fn create_at(plugin_dir: &Path, command: &str, now: OffsetDateTime) -> io::Result<Self> {
        let date = now
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(io::Error::other)?;
        let stamp = now
            .format(format_description!(
                "[year][month][day]T[hour][minute][second]Z"
            ))
            .map_err(io::Error::other)?;
        let dir = plugin_dir.join("logs").join(date);
        fs::create_dir_all(&dir)?;
        Self::open(dir.join(format!("{}-{stamp}.log", file_safe(command))))
    }

    /// Opens (or creates) a log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns any error raised while opening the file.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            sink: Arc::new(Mutex::new(file)),
        })
    }

    /// Returns the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event. Object entries in `fields` are added to the line;
    /// a `ts` field replaces the automatic timestamp. Write failures are
    /// reported through `tracing` and otherwise ignored.
    pub fn record(&self, level: LogLevel, message: &str, fields: Value) {
        let mut line = ConfigMap::new();
        line.insert(String::from("ts"), Value::String(now_rfc3339()));
        line.insert(String::from("level"), Value::String(level.to_string()));
        line.insert(String::from("message"), Value::String(message.to_owned()));
        if let Value::Object(extra) = fields {
            line.extend(extra);
        }
        if let Err(error) = self.write_line(&Value::Object(line)) {
            warn!(
                target: LOG_TARGET,
                path = %self.path.display(),
                %error,
                "failed to write dispatch log line"
            );
        }
    }

    fn write_line(&self, line: &Value) -> io::Result<()> {
        let mut bytes = serde_json::to_vec(line).map_err(io::Error::other)?;
        bytes.push(b'\n');
        let mut file = self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(&bytes)?;
        file.flush()
    }
}

/// Final status of a dispatch as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchStatus {
    /// Every step succeeded or was tolerated.
    Ok,
    /// The dispatch failed.
    Error,
    /// The deadline expired or the dispatch was cancelled.
    Canceled,
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    ts: String,
    plugin: String,
    command: String,
    args: Vec<String>,
    status: DispatchStatus,
    log_file: String,
    duration_ms: u64,
}

impl DispatchRecord {
    /// Creates a record stamped with the current UTC time.
    #[must_use]
    pub fn new(
        plugin: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        status: DispatchStatus,
        log_file: Option<&Path>,
        duration: Duration,
    ) -> Self {
        Self {
            ts: now_rfc3339(),
            plugin: plugin.into(),
            command: command.into(),
            args,
            status,
            log_file: log_file.map(|path| path.display().to_string()).unwrap_or_default(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the RFC 3339 timestamp.
    #[must_use]
    pub const fn ts(&self) -> &str {
        self.ts.as_str()
    }

    /// Returns the resolved install name (or the identifier if unresolved).
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the command name.
    #[must_use]
    pub const fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Returns the pass-through arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the final status.
    #[must_use]
    pub const fn status(&self) -> DispatchStatus {
        self.status
    }

    /// Returns the per-run log file; empty when none was opened.
    #[must_use]
    pub const fn log_file(&self) -> &str {
        self.log_file.as_str()
    }

    /// Returns the total elapsed time in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// Environment-wide append-only ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchLedger {
    path: PathBuf,
}

impl DispatchLedger {
    /// Creates a ledger at an explicit path.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Creates the ledger of an environment.
    #[must_use]
    pub fn for_layout(layout: &EnvLayout) -> Self {
        Self::new(layout.ledger_path())
    }

    /// Returns the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns any error raised while creating or writing the file.
    pub fn append(&self, record: &DispatchRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut bytes = serde_json::to_vec(record).map_err(io::Error::other)?;
        bytes.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&bytes)?;
        file.flush()
    }

    /// Reads every decodable record; a missing ledger is empty.
    ///
    /// # Errors
    ///
    /// Returns read errors other than a missing file.
    pub fn records(&self) -> io::Result<Vec<DispatchRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            if let Ok(record) = serde_json::from_str(&line?) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn file_safe(command: &str) -> String {
    let cleaned: String = command
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        String::from("dispatch")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests;
