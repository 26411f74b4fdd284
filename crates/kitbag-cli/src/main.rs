//! Entrypoint for the `kitbag` binary.
//!
//! Everything happens in [`kitbag_cli::run`] so tests can drive the same
//! code with in-memory streams.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    kitbag_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
