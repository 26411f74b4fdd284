//! Executor abstraction shared by the dispatcher and its test doubles.
//!
//! An [`Invocation`] is a fully planned step: executor kind, program,
//! arguments, resolved working directory and environment overrides. A
//! [`StepExecutor`] runs it and reports either an [`ExecutionOutcome`] or an
//! [`ExecutionFault`]. The production implementation is
//! [`ProcessExecutor`](crate::process::ProcessExecutor).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::deadline::Deadline;
use crate::dispatch_log::DispatchLog;
use crate::manifest::ExecutorKind;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};

/// A step ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    executor: ExecutorKind,
    program: String,
    args: Vec<String>,
    pass_args: Vec<String>,
    workdir: PathBuf,
    env: BTreeMap<String, String>,
    plugin_dir: PathBuf,
}

impl Invocation {
    /// Creates an invocation running in `plugin_dir` with no arguments.
    #[must_use]
    pub fn new(executor: ExecutorKind, program: impl Into<String>, plugin_dir: impl Into<PathBuf>) -> Self {
        let plugin_dir = plugin_dir.into();
        Self {
            executor,
            program: program.into(),
            args: Vec::new(),
            pass_args: Vec::new(),
            workdir: plugin_dir.clone(),
            env: BTreeMap::new(),
            plugin_dir,
        }
    }

    /// Sets the manifest-declared arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the caller's pass-through arguments appended after `args`.
    #[must_use]
    pub fn with_pass_args(mut self, pass_args: Vec<String>) -> Self {
        self.pass_args = pass_args;
        self
    }

    /// Sets the working directory: empty means the plugin directory,
    /// relative paths are joined onto it, absolute paths are kept.
    #[must_use]
    pub fn with_workdir(mut self, workdir: &str) -> Self {
        let trimmed = workdir.trim();
        self.workdir = if trimmed.is_empty() {
            self.plugin_dir.clone()
        } else {
            self.plugin_dir.join(trimmed)
        };
        self
    }

    /// Sets environment overrides.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Returns the executor kind.
    #[must_use]
    pub const fn executor(&self) -> ExecutorKind {
        self.executor
    }

    /// Returns the program as written in the manifest.
    #[must_use]
    pub const fn program(&self) -> &str {
        self.program.as_str()
    }

    /// Returns the manifest-declared arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the pass-through arguments.
    #[must_use]
    pub fn pass_args(&self) -> &[String] {
        &self.pass_args
    }

    /// Returns the resolved working directory.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Returns environment overrides.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the plugin directory.
    #[must_use]
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Builds the shell command line: the program, or the joined arguments
    /// when the program is empty, followed by any pass-through arguments.
    #[must_use]
    pub fn shell_line(&self) -> String {
        let mut line = self.program.trim().to_owned();
        if line.is_empty() {
            line = self.args.join(" ");
        }
        if !self.pass_args.is_empty() {
            line.push(' ');
            line.push_str(&self.pass_args.join(" "));
        }
        line.trim().to_owned()
    }

    /// Builds the argument vector for a stdio program.
    #[must_use]
    pub fn stdio_argv(&self) -> Vec<String> {
        self.args.iter().chain(&self.pass_args).cloned().collect()
    }
}

/// What a finished step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    exit_code: i32,
    response: Option<ResponseEnvelope>,
}

impl ExecutionOutcome {
    /// A process that exited without a protocol response (shell steps).
    #[must_use]
    pub const fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            response: None,
        }
    }

    /// A stdio process that answered with `response`.
    #[must_use]
    pub const fn responded(exit_code: i32, response: ResponseEnvelope) -> Self {
        Self {
            exit_code,
            response: Some(response),
        }
    }

    /// Returns the process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns the decoded response, for stdio steps.
    #[must_use]
    pub const fn response(&self) -> Option<&ResponseEnvelope> {
        self.response.as_ref()
    }
}

/// A step that ended without a usable result.
///
/// These stand in for the synthetic error response of the stdio protocol:
/// they carry the message a plugin would otherwise have reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFault {
    /// The process could not be started.
    #[error("failed to start '{program}': {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// OS diagnostic.
        message: String,
    },

    /// The stdio response was missing or malformed.
    #[error("invalid response (exit code {exit_code}): {message}")]
    Protocol {
        /// Exit code of the process, or 1 when it did not exit cleanly.
        exit_code: i32,
        /// Decoder diagnostic.
        message: String,
    },

    /// The deadline expired and the process was killed.
    #[error("killed after the dispatch deadline expired")]
    Canceled,
}

/// Runs planned steps.
///
/// Implementations must honour `deadline` at every blocking point and write
/// captured output to `log`. Test doubles can implement this trait to return
/// scripted outcomes without spawning processes.
pub trait StepExecutor {
    /// Runs `invocation`. `request` is the envelope for stdio steps.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutionFault`] when the process could not be started,
    /// produced no usable response, or was killed at the deadline.
    fn execute(
        &self,
        invocation: &Invocation,
        request: &RequestEnvelope,
        log: &DispatchLog,
        deadline: &Deadline,
    ) -> Result<ExecutionOutcome, ExecutionFault>;
}

impl<E: StepExecutor + ?Sized> StepExecutor for &E {
    fn execute(
        &self,
        invocation: &Invocation,
        request: &RequestEnvelope,
        log: &DispatchLog,
        deadline: &Deadline,
    ) -> Result<ExecutionOutcome, ExecutionFault> {
        (**self).execute(invocation, request, log, deadline)
    }
}

#[cfg(test)]
mod tests;
