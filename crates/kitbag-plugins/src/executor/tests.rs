//! Unit tests for invocation planning helpers.

use rstest::rstest;

use super::*;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[rstest]
#[case::program_only("make all", &[], &[], "make all")]
#[case::program_wins_over_args("make", &["ignored"], &[], "make")]
#[case::args_when_program_empty("", &["echo", "hi"], &[], "echo hi")]
#[case::pass_args_appended("echo", &[], &["a", "b"], "echo a b")]
#[case::trimmed("  ls  ", &[], &[], "ls")]
fn shell_line_composition(
    #[case] program: &str,
    #[case] args: &[&str],
    #[case] pass: &[&str],
    #[case] expected: &str,
) {
    let invocation = Invocation::new(ExecutorKind::Shell, program, "/p")
        .with_args(strings(args))
        .with_pass_args(strings(pass));
    assert_eq!(invocation.shell_line(), expected);
}

#[test]
fn stdio_argv_places_pass_args_last() {
    let invocation = Invocation::new(ExecutorKind::Stdio, "./run", "/p")
        .with_args(strings(&["--mode", "fast"]))
        .with_pass_args(strings(&["target"]));
    assert_eq!(invocation.stdio_argv(), ["--mode", "fast", "target"]);
}

#[rstest]
#[case::empty("", "/p")]
#[case::relative("sub/dir", "/p/sub/dir")]
#[case::absolute("/tmp/work", "/tmp/work")]
fn workdir_resolution(#[case] workdir: &str, #[case] expected: &str) {
    let invocation = Invocation::new(ExecutorKind::Shell, "true", "/p").with_workdir(workdir);
    assert_eq!(invocation.workdir(), Path::new(expected));
}

#[test]
fn faults_render_their_cause() {
    let fault = ExecutionFault::Protocol {
        exit_code: 0,
        message: String::from("EOF while parsing"),
    };
    assert_eq!(fault.to_string(), "invalid response (exit code 0): EOF while parsing");
}
