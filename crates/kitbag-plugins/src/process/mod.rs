//! Process-backed step execution.
//!
//! [`ProcessExecutor`] implements [`StepExecutor`] by spawning real child
//! processes. Shell steps run their command line through `bash -c` (or
//! `cmd /C` on Windows) and report the exit code. Stdio steps receive the
//! serialised [`RequestEnvelope`] on stdin and must answer with one JSON
//! value on stdout. Both kinds stream stderr (and shell stdout) into the
//! dispatch log line by line.
//!
//! On unix every child leads its own process group so that a deadline kill
//! also reaches grandchildren still holding the output pipes. The deadline
//! bounds both the wait for the child and the drain of its pipes.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::dispatch_log::{DispatchLog, LogLevel};
use crate::entry::plan_launch;
use crate::executor::{ExecutionFault, ExecutionOutcome, Invocation, StepExecutor};
use crate::manifest::ExecutorKind;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};

/// Tracing target for child process operations.
const PROCESS_TARGET: &str = "kitbag_plugins::process";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs steps as child processes of the current process.
///
/// ```rust,no_run
/// use kitbag_plugins::{Dispatcher, EnvLayout, ProcessExecutor};
///
/// let dispatcher = Dispatcher::new(EnvLayout::new("."), ProcessExecutor);
/// # let _ = dispatcher;
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessExecutor;

impl StepExecutor for ProcessExecutor {
    fn execute(
        &self,
        invocation: &Invocation,
        request: &RequestEnvelope,
        log: &DispatchLog,
        deadline: &Deadline,
    ) -> Result<ExecutionOutcome, ExecutionFault> {
        match invocation.executor() {
            ExecutorKind::Shell => run_shell(invocation, log, deadline),
            ExecutorKind::Stdio => run_stdio(invocation, request, log, deadline),
        }
    }
}

fn run_shell(
    invocation: &Invocation,
    log: &DispatchLog,
    deadline: &Deadline,
) -> Result<ExecutionOutcome, ExecutionFault> {
    let line = invocation.shell_line();
    let mut command = shell_command(&line);
    command
        .current_dir(invocation.workdir())
        .envs(invocation.env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);

    debug!(
        target: PROCESS_TARGET,
        command = %line,
        workdir = %invocation.workdir().display(),
        "spawning shell step"
    );
    log.record(
        LogLevel::Debug,
        "spawn shell",
        json!({"command": line, "workdir": invocation.workdir().display().to_string()}),
    );

    let mut child = command.spawn().map_err(|err| ExecutionFault::Spawn {
        program: line.clone(),
        message: err.to_string(),
    })?;

    let stdout = pump_lines(child.stdout.take(), log.clone(), LogLevel::Stdout);
    let stderr = pump_lines(child.stderr.take(), log.clone(), LogLevel::Stderr);

    let group = child.id();
    let status = wait_with_deadline(&mut child, &line, deadline)?;
    drain(stdout, group, &line, deadline)?;
    drain(stderr, group, &line, deadline)?;

    let exit_code = exit_code(status);
    debug!(target: PROCESS_TARGET, command = %line, exit_code, "shell step exited");
    Ok(ExecutionOutcome::exited(exit_code))
}

fn run_stdio(
    invocation: &Invocation,
    request: &RequestEnvelope,
    log: &DispatchLog,
    deadline: &Deadline,
) -> Result<ExecutionOutcome, ExecutionFault> {
    let launch = plan_launch(
        invocation.program(),
        &invocation.stdio_argv(),
        invocation.plugin_dir(),
    );
    let program = launch.program().display().to_string();

    let mut payload = serde_json::to_vec(request).map_err(|err| ExecutionFault::Spawn {
        program: program.clone(),
        message: format!("cannot encode request: {err}"),
    })?;
    payload.push(b'\n');

    let mut command = Command::new(launch.program());
    command
        .args(launch.args())
        .current_dir(invocation.workdir())
        .envs(invocation.env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);

    let args: Vec<String> = launch
        .args()
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let interpreter = launch
        .interpreter()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    debug!(
        target: PROCESS_TARGET,
        entry = invocation.program(),
        interpreter = %interpreter,
        request_bytes = payload.len(),
        "spawning stdio step"
    );
    log.record(
        LogLevel::Debug,
        "spawn stdio",
        json!({
            "entry": invocation.program(),
            "interp": interpreter,
            "args": args,
            "workdir": invocation.workdir().display().to_string(),
        }),
    );

    let mut child = command.spawn().map_err(|err| ExecutionFault::Spawn {
        program: program.clone(),
        message: err.to_string(),
    })?;

    // The plugin may exit without reading its input; a broken pipe is not
    // an error of the step.
    let writer = child.stdin.take().map(|mut stdin| {
        spawn_reporting(move || {
            drop(stdin.write_all(&payload));
        })
    });
    let stderr = pump_lines(child.stderr.take(), log.clone(), LogLevel::Stderr);
    let stdout = child.stdout.take().map(|mut stdout| {
        spawn_reporting(move || {
            let mut buffer = Vec::new();
            drop(stdout.read_to_end(&mut buffer));
            buffer
        })
    });

    let group = child.id();
    let status = wait_with_deadline(&mut child, &program, deadline)?;
    drain(writer, group, &program, deadline)?;
    drain(stderr, group, &program, deadline)?;
    let output = drain(stdout, group, &program, deadline)?.unwrap_or_default();

    let exit_code = exit_code(status);
    debug!(
        target: PROCESS_TARGET,
        entry = invocation.program(),
        exit_code,
        response_bytes = output.len(),
        "stdio step exited"
    );
    decode_response(&output, exit_code)
}

/// Decodes the first JSON value written to stdout. Trailing output is
/// ignored.
pub(crate) fn decode_response(output: &[u8], exit_code: i32) -> Result<ExecutionOutcome, ExecutionFault> {
    match serde_json::Deserializer::from_slice(output)
        .into_iter::<ResponseEnvelope>()
        .next()
    {
        Some(Ok(response)) => Ok(ExecutionOutcome::responded(exit_code, response)),
        Some(Err(err)) => Err(ExecutionFault::Protocol {
            exit_code,
            message: err.to_string(),
        }),
        None => Err(ExecutionFault::Protocol {
            exit_code,
            message: String::from("plugin produced no output on stdout"),
        }),
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("bash");
    command.arg("-c").arg(line);
    command
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// Runs `work` on a new thread and delivers its result on the returned
/// channel.
fn spawn_reporting<T, F>(work: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        drop(sender.send(work()));
    });
    receiver
}

/// Forwards each line of `stream` to the dispatch log.
fn pump_lines<R>(stream: Option<R>, log: DispatchLog, level: LogLevel) -> Option<Receiver<()>>
where
    R: Read + Send + 'static,
{
    stream.map(|source| {
        spawn_reporting(move || {
            let mut reader = BufReader::new(source);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        log.record(level, text.trim_end_matches(['\r', '\n']), Value::Null);
                    }
                }
            }
        })
    })
}

/// Waits for a pipe thread after the child has exited.
///
/// A grandchild left running in the background can hold the pipe open long
/// after the child is gone. When the deadline expires first the whole process
/// group is killed and the step is canceled. A thread that died without
/// reporting yields `None`.
fn drain<T>(
    receiver: Option<Receiver<T>>,
    group: u32,
    program: &str,
    deadline: &Deadline,
) -> Result<Option<T>, ExecutionFault> {
    let Some(channel) = receiver else {
        return Ok(None);
    };
    loop {
        match channel.recv_timeout(poll_pause(deadline)) {
            Ok(value) => return Ok(Some(value)),
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_expired() {
                    warn!(
                        target: PROCESS_TARGET,
                        program,
                        pgid = group,
                        "deadline expired while draining output, killing process group"
                    );
                    kill_group(group);
                    return Err(ExecutionFault::Canceled);
                }
            }
        }
    }
}

fn poll_pause(deadline: &Deadline) -> Duration {
    deadline
        .remaining()
        .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL))
        .max(Duration::from_millis(1))
}

/// Polls the child until it exits or the deadline expires.
fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    deadline: &Deadline,
) -> Result<ExitStatus, ExecutionFault> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if deadline.is_expired() {
                    warn!(
                        target: PROCESS_TARGET,
                        program,
                        pid = child.id(),
                        "deadline expired, killing process"
                    );
                    terminate(child);
                    return Err(ExecutionFault::Canceled);
                }
                thread::sleep(poll_pause(deadline));
            }
            Err(err) => {
                terminate(child);
                return Err(ExecutionFault::Spawn {
                    program: program.to_owned(),
                    message: format!("failed to wait for process: {err}"),
                });
            }
        }
    }
}

fn terminate(child: &mut Child) {
    if !kill_group(child.id()) {
        drop(child.kill());
    }
    drop(child.wait());
}

/// Sends `SIGKILL` to the process group led by `group`.
///
/// The group outlives its leader while any member is alive, so this still
/// reaches grandchildren after the child itself has been reaped.
#[cfg(unix)]
fn kill_group(group: u32) -> bool {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    i32::try_from(group).is_ok_and(|pid| killpg(Pid::from_raw(pid), Signal::SIGKILL).is_ok())
}

#[cfg(not(unix))]
const fn kill_group(_group: u32) -> bool {
    false
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| signal.saturating_add(128)))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
