//! Command dispatch across resolver, manifest, executor and mutation stores.
//!
//! [`Dispatcher::dispatch`] is the single entry point used by the CLI. It
//! resolves the plugin, validates its manifest, plans every step of the
//! requested command up front, then runs the steps in order through a
//! [`StepExecutor`]. Stdio responses may carry configuration mutations,
//! which are persisted before the next step starts so that later steps see
//! them in their request envelope.
//!
//! Failure policy:
//!
//! - a failed step aborts the run unless its `continue_on_error` flag or the
//!   request's keep-going flag tolerates it,
//! - configuration load and persist failures are always fatal,
//! - an expired [`Deadline`] cancels the step in flight and skips the rest.
//!
//! Every dispatch, successful or not, appends one [`DispatchRecord`] to the
//! environment ledger.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kitbag_config::MergeStrategy;
use serde_json::json;
use strum::Display;
use tracing::{debug, info, warn};

use crate::deadline::Deadline;
use crate::dispatch_log::{DispatchLedger, DispatchLog, DispatchRecord, DispatchStatus, LogLevel};
use crate::error::{DispatchError, DispatchFailure, StepFailure};
use crate::executor::{ExecutionFault, ExecutionOutcome, Invocation, StepExecutor};
use crate::layout::EnvLayout;
use crate::manifest::{CommandSpec, ExecutorKind, PluginManifest};
use crate::mutation::MutationApplier;
use crate::protocol::{ConfigSnapshot, RequestEnvelope, RequestPaths, ResponseEnvelope};
use crate::registry::RegistryStore;
use crate::resolver::resolve_plugin;

/// Tracing target for dispatch orchestration.
const DISPATCH_TARGET: &str = "kitbag_plugins::dispatch";

/// What the caller wants to run.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    plugin: String,
    command: String,
    args: Vec<String>,
    strategy: MergeStrategy,
    keep_going: bool,
    deadline: Deadline,
}

impl DispatchRequest {
    /// Creates a request with no arguments, the `override` strategy,
    /// fail-fast policy and no deadline.
    #[must_use]
    pub fn new(plugin: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            command: command.into(),
            args: Vec::new(),
            strategy: MergeStrategy::default(),
            keep_going: false,
            deadline: Deadline::none(),
        }
    }

    /// Sets the pass-through arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the strategy used for global mutations.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Continues past failed steps of multi-step commands.
    #[must_use]
    pub const fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Bounds the whole dispatch.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Returns the plugin identifier.
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

    /// Returns the merge strategy.
    #[must_use]
    pub const fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Returns the keep-going flag.
    #[must_use]
    pub const fn keep_going(&self) -> bool {
        self.keep_going
    }

    /// Returns the deadline.
    #[must_use]
    pub const fn deadline(&self) -> &Deadline {
        &self.deadline
    }
}

/// Result of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    /// Exit code zero and, for stdio, status `ok`.
    Succeeded,
    /// Anything else.
    Failed,
}

/// Summary of a finished step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    index: usize,
    executor: ExecutorKind,
    exit_code: i32,
    status: StepStatus,
    duration: Duration,
    tolerated: bool,
}

impl StepReport {
    /// Returns the zero-based step index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns the executor the step ran with.
    #[must_use]
    pub const fn executor(&self) -> ExecutorKind {
        self.executor
    }

    /// Returns the process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns the outcome.
    #[must_use]
    pub const fn status(&self) -> StepStatus {
        self.status
    }

    /// Returns the wall-clock duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns true when the step failed and the run continued anyway.
    #[must_use]
    pub const fn tolerated(&self) -> bool {
        self.tolerated
    }
}

/// Summary of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    plugin: String,
    install_name: String,
    command: String,
    log_file: PathBuf,
    duration: Duration,
    steps: Vec<StepReport>,
    logs: Vec<String>,
    artifacts: Vec<String>,
}

impl DispatchReport {
    /// Returns the manifest name of the plugin.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the install directory name.
    #[must_use]
    pub const fn install_name(&self) -> &str {
        self.install_name.as_str()
    }

    /// Returns the command that ran.
    #[must_use]
    pub const fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Returns the per-run log file.
    #[must_use]
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Returns the total duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns one report per executed step.
    #[must_use]
    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    /// Returns the log lines returned by stdio steps.
    #[must_use]
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Returns the artifacts returned by stdio steps.
    #[must_use]
    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }
}

/// Runs plugin commands inside one environment.
#[derive(Debug)]
pub struct Dispatcher<E> {
    layout: EnvLayout,
    registry: RegistryStore,
    ledger: DispatchLedger,
    executor: E,
}

impl<E> Dispatcher<E> {
    /// Creates a dispatcher for the environment at `layout`.
    #[must_use]
    pub fn new(layout: EnvLayout, executor: E) -> Self {
        Self {
            registry: RegistryStore::for_layout(&layout),
            ledger: DispatchLedger::for_layout(&layout),
            layout,
            executor,
        }
    }

    /// Returns the environment layout.
    #[must_use]
    pub const fn layout(&self) -> &EnvLayout {
        &self.layout
    }

    /// Returns the registry store.
    #[must_use]
    pub const fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    /// Returns the dispatch ledger.
    #[must_use]
    pub const fn ledger(&self) -> &DispatchLedger {
        &self.ledger
    }

    /// Returns the step executor.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }
}

/// A step ready to run, with its failure policy.
#[derive(Debug)]
struct PlannedStep {
    invocation: Invocation,
    tolerated: bool,
}

/// State gathered while a dispatch runs, kept for the ledger on failure.
#[derive(Debug, Default)]
struct RunTrace {
    install_name: Option<String>,
    log: Option<DispatchLog>,
}

impl<E: StepExecutor> Dispatcher<E> {
    /// Runs `request` to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchFailure`] carrying the terminal [`DispatchError`]
    /// and the per-run log file when one was created.
    pub fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReport, DispatchFailure> {
        let started = Instant::now();
        let mut trace = RunTrace::default();
        let result = self.run(request, &mut trace, started);
        let log_file = trace.log.as_ref().map(|log| log.path().to_path_buf());

        if let (Err(error), Some(log)) = (&result, &trace.log) {
            log.record(
                LogLevel::Error,
                "dispatch failed",
                json!({"error": error.to_string()}),
            );
        }

        let status = match &result {
            Ok(_) => DispatchStatus::Ok,
            Err(error) if error.is_canceled() => DispatchStatus::Canceled,
            Err(_) => DispatchStatus::Error,
        };
        self.append_ledger(request, &trace, status, log_file.as_deref(), started.elapsed());

        result.map_err(|error| DispatchFailure::new(error, log_file))
    }

    fn run(
        &self,
        request: &DispatchRequest,
        trace: &mut RunTrace,
        started: Instant,
    ) -> Result<DispatchReport, DispatchError> {
        let resolved = resolve_plugin(&self.layout, &self.registry, request.plugin())?;
        let plugin_dir = resolved.dir();
        let install_name = resolved.install_name().to_owned();
        trace.install_name = Some(install_name.clone());

        let log = DispatchLog::create(plugin_dir, request.command()).map_err(|source| {
            DispatchError::Log {
                path: plugin_dir.join("logs"),
                source: Arc::new(source),
            }
        })?;
        trace.log = Some(log.clone());

        let manifest = load_manifest(plugin_dir, &install_name)?;
        let applier =
            MutationApplier::for_plugin(&self.layout, plugin_dir, &manifest, request.strategy());
        let mut snapshot = applier
            .load_snapshot()
            .map_err(|source| DispatchError::ConfigLoad { source })?;

        info!(
            target: DISPATCH_TARGET,
            plugin = install_name.as_str(),
            command = request.command(),
            "dispatch start"
        );
        log.record(
            LogLevel::Info,
            "dispatch start",
            json!({
                "plugin": manifest.name(),
                "install_name": install_name,
                "action": request.command(),
                "args": request.args(),
                "merge_strategy": request.strategy(),
                "keep_going": request.keep_going(),
                "timeout": request.deadline().remaining_secs(),
            }),
        );

        let command = manifest.resolve_command(request.command()).ok_or_else(|| {
            DispatchError::CommandNotFound {
                plugin: install_name.clone(),
                command: request.command().to_owned(),
            }
        })?;
        let plan = plan_steps(&command, request, plugin_dir)?;
        let paths = RequestPaths::new(
            self.layout.root().to_path_buf(),
            self.layout.bin_dir(),
            self.layout.workspace_dir(),
            plugin_dir.to_path_buf(),
        );

        let mut steps = Vec::with_capacity(plan.len());
        let mut output = ResponseOutput::default();

        for (index, step) in plan.iter().enumerate() {
            if request.deadline().is_expired() {
                return Err(DispatchError::Canceled { index });
            }
            let step_started = Instant::now();
            let invocation = &step.invocation;
            log.record(
                LogLevel::Info,
                "step start",
                json!({
                    "step_index": index,
                    "executor": invocation.executor(),
                    "program": invocation.program(),
                    "args": invocation.args(),
                    "continue_on_error": step.tolerated,
                }),
            );

            let envelope = RequestEnvelope::new(
                request.command(),
                request.args().to_vec(),
                paths.clone(),
                snapshot.clone(),
                request.strategy(),
            );
            let (exit_code, failure) =
                match self
                    .executor
                    .execute(invocation, &envelope, &log, request.deadline())
                {
                    Ok(outcome) => {
                        if let Some(response) = outcome.response() {
                            absorb_response(response, &applier, &mut snapshot, &mut output, &log, index)?;
                        }
                        (outcome.exit_code(), step_failure(&outcome))
                    }
                    Err(ExecutionFault::Canceled) => {
                        log.record(
                            LogLevel::Error,
                            "step canceled",
                            json!({"step_index": index}),
                        );
                        return Err(DispatchError::Canceled { index });
                    }
                    Err(fault @ ExecutionFault::Spawn { .. }) => (
                        1,
                        Some(StepFailure::Spawn {
                            message: fault.to_string(),
                        }),
                    ),
                    Err(ExecutionFault::Protocol { exit_code, message }) => {
                        (exit_code, Some(StepFailure::Protocol { message }))
                    }
                };

            let duration = step_started.elapsed();
            log.record(
                LogLevel::Info,
                "step end",
                json!({
                    "step_index": index,
                    "duration_ms": millis(duration),
                    "exit_code": exit_code,
                }),
            );
            steps.push(StepReport {
                index,
                executor: invocation.executor(),
                exit_code,
                status: if failure.is_some() {
                    StepStatus::Failed
                } else {
                    StepStatus::Succeeded
                },
                duration,
                tolerated: failure.is_some() && step.tolerated,
            });

            if let Some(cause) = failure {
                if !step.tolerated {
                    return Err(DispatchError::StepFailed { index, cause });
                }
                warn!(
                    target: DISPATCH_TARGET,
                    plugin = install_name.as_str(),
                    step = index,
                    %cause,
                    "step failed, continuing"
                );
                log.record(
                    LogLevel::Warn,
                    "step failed, continuing",
                    json!({"step_index": index, "error": cause.to_string()}),
                );
            }
        }

        let duration = started.elapsed();
        log.record(
            LogLevel::Info,
            "dispatch end",
            json!({"duration_ms": millis(duration), "steps": steps.len()}),
        );
        debug!(
            target: DISPATCH_TARGET,
            plugin = install_name.as_str(),
            duration_ms = millis(duration),
            "dispatch end"
        );

        Ok(DispatchReport {
            plugin: manifest.name().to_owned(),
            install_name,
            command: request.command().to_owned(),
            log_file: log.path().to_path_buf(),
            duration,
            steps,
            logs: output.logs,
            artifacts: output.artifacts,
        })
    }

    fn append_ledger(
        &self,
        request: &DispatchRequest,
        trace: &RunTrace,
        status: DispatchStatus,
        log_file: Option<&Path>,
        duration: Duration,
    ) {
        let plugin = trace.install_name.as_deref().unwrap_or(request.plugin());
        let record = DispatchRecord::new(
            plugin,
            request.command(),
            request.args().to_vec(),
            status,
            log_file,
            duration,
        );
        if let Err(error) = self.ledger.append(&record) {
            warn!(
                target: DISPATCH_TARGET,
                path = %self.ledger.path().display(),
                %error,
                "failed to append dispatch ledger"
            );
        }
    }
}

/// Log lines and artifacts collected from stdio responses.
#[derive(Debug, Default)]
struct ResponseOutput {
    logs: Vec<String>,
    artifacts: Vec<String>,
}

/// Persists a response's mutations and collects its logs and artifacts.
fn absorb_response(
    response: &ResponseEnvelope,
    applier: &MutationApplier,
    snapshot: &mut ConfigSnapshot,
    output: &mut ResponseOutput,
    log: &DispatchLog,
    index: usize,
) -> Result<(), DispatchError> {
    if let Some(mutations) = response.mutations().filter(|mutations| !mutations.is_empty()) {
        let applied = applier
            .apply(mutations, snapshot)
            .map_err(|source| DispatchError::MutationPersist { source })?;
        log.record(
            LogLevel::Info,
            "mutations applied",
            json!({
                "step_index": index,
                "merge_strategy": applier.strategy(),
                "global": applied.global_updated(),
                "plugin": applied.plugin_updated(),
            }),
        );
        *snapshot = applied.into_snapshot();
    }
    for line in response.logs() {
        log.record(LogLevel::Info, line, json!({"source": "plugin"}));
        output.logs.push(line.clone());
    }
    for artifact in response.artifacts() {
        log.record(LogLevel::Info, "artifact", json!({"path": artifact}));
        output.artifacts.push(artifact.clone());
    }
    Ok(())
}

fn load_manifest(plugin_dir: &Path, install_name: &str) -> Result<PluginManifest, DispatchError> {
    PluginManifest::load(plugin_dir)
        .and_then(|manifest| manifest.validate().map(|()| manifest))
        .map_err(|source| DispatchError::ManifestInvalid {
            plugin: install_name.to_owned(),
            source,
        })
}

/// Builds every invocation before anything runs, so an unsupported
/// executor in a late step is reported without side effects.
fn plan_steps(
    command: &CommandSpec,
    request: &DispatchRequest,
    plugin_dir: &Path,
) -> Result<Vec<PlannedStep>, DispatchError> {
    if command.steps().is_empty() {
        let executor = command
            .executor_kind()
            .or_else(|| command.use_stdio().then_some(ExecutorKind::Stdio))
            .ok_or_else(|| unsupported(command.name(), command.executor()))?;
        let invocation = Invocation::new(executor, command.program(), plugin_dir)
            .with_args(command.args().to_vec())
            .with_pass_args(request.args().to_vec())
            .with_workdir(command.workdir())
            .with_env(command.env().clone());
        return Ok(vec![PlannedStep {
            invocation,
            tolerated: false,
        }]);
    }

    command
        .steps()
        .iter()
        .map(|step| {
            let executor = step
                .executor_kind()
                .ok_or_else(|| unsupported(command.name(), step.executor()))?;
            let pass_args = match executor {
                ExecutorKind::Stdio => request.args().to_vec(),
                ExecutorKind::Shell => Vec::new(),
            };
            let invocation = Invocation::new(executor, step.program(), plugin_dir)
                .with_args(step.args().to_vec())
                .with_pass_args(pass_args)
                .with_workdir(step.workdir())
                .with_env(step.env().clone());
            Ok(PlannedStep {
                invocation,
                tolerated: step.continue_on_error() || request.keep_going(),
            })
        })
        .collect()
}

fn unsupported(command: &str, executor: &str) -> DispatchError {
    DispatchError::UnsupportedExecutor {
        command: command.to_owned(),
        executor: executor.to_owned(),
    }
}

fn step_failure(outcome: &ExecutionOutcome) -> Option<StepFailure> {
    match outcome.response() {
        Some(response) if !response.is_ok() => Some(StepFailure::PluginStatus {
            status: response.status().to_owned(),
            message: response.message().to_owned(),
        }),
        _ if outcome.exit_code() != 0 => Some(StepFailure::ExitCode {
            code: outcome.exit_code(),
        }),
        _ => None,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
