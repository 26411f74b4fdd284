//! Unit tests for the dispatch log and ledger.

use std::fs;
use std::thread;

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;
use time::macros::datetime;

use super::*;

#[fixture]
fn dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("read log")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[rstest]
fn log_path_is_partitioned_by_date(dir: TempDir) {
    let log = DispatchLog::create_at(dir.path(), "build", datetime!(2024-03-09 7:05:01 UTC))
        .expect("create");
    assert_eq!(
        log.path(),
        dir.path().join("logs/2024-03-09/build-20240309T070501Z.log")
    );
    assert!(log.path().is_file());
}

#[rstest]
#[case::slash("ci/build", "ci_build")]
#[case::backslash("a\\b", "a_b")]
#[case::empty("", "dispatch")]
fn command_names_are_made_file_safe(dir: TempDir, #[case] command: &str, #[case] stem: &str) {
    let log = DispatchLog::create_at(dir.path(), command, datetime!(2024-01-01 0:00 UTC))
        .expect("create");
    let name = log.path().file_name().and_then(|n| n.to_str()).expect("name");
    assert_eq!(name, format!("{stem}-20240101T000000Z.log"));
}

#[rstest]
fn records_carry_level_message_and_timestamp(dir: TempDir) {
    let log = DispatchLog::create(dir.path(), "build").expect("create");
    log.record(LogLevel::Info, "step start", json!({"step_index": 0}));
    log.record(LogLevel::Stderr, "warning: x", Value::Null);
    log.record(LogLevel::Debug, "custom", json!({"ts": "fixed"}));

    let written = lines(log.path());
    assert_eq!(written.len(), 3);
    assert_eq!(written[0]["level"], json!("info"));
    assert_eq!(written[0]["message"], json!("step start"));
    assert_eq!(written[0]["step_index"], json!(0));
    assert!(written[0]["ts"].as_str().is_some_and(|ts| ts.ends_with('Z')));
    assert_eq!(written[1]["level"], json!("stderr"));
    assert_eq!(written[2]["ts"], json!("fixed"));
}

#[rstest]
fn clones_write_whole_lines_concurrently(dir: TempDir) {
    let log = DispatchLog::create(dir.path(), "pump").expect("create");
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let log = log.clone();
            thread::spawn(move || {
                for n in 0..25 {
                    log.record(LogLevel::Stdout, &format!("w{worker} n{n}"), Value::Null);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker");
    }
    assert_eq!(lines(log.path()).len(), 100);
}

#[rstest]
fn ledger_appends_and_reads_back(dir: TempDir) {
    let ledger = DispatchLedger::new(dir.path().join(".kitbag/logs/dispatch.log"));
    assert!(ledger.records().expect("empty").is_empty());

    let first = DispatchRecord::new(
        "toolkit",
        "build",
        vec![String::from("-v")],
        DispatchStatus::Ok,
        Some(Path::new("/env/plugins/toolkit/logs/x.log")),
        Duration::from_millis(42),
    );
    let second = DispatchRecord::new("ghost", "run", vec![], DispatchStatus::Error, None, Duration::ZERO);
    ledger.append(&first).expect("append first");
    ledger.append(&second).expect("append second");

    let records = ledger.records().expect("records");
    assert_eq!(records, [first, second]);
    assert_eq!(records[1].log_file(), "");

    let raw = fs::read_to_string(ledger.path()).expect("read");
    let line: Value = serde_json::from_str(raw.lines().next().expect("line")).expect("json");
    assert_eq!(line["status"], json!("ok"));
    assert_eq!(line["duration_ms"], json!(42));
    assert_eq!(line["log_file"], json!("/env/plugins/toolkit/logs/x.log"));
}

#[test]
fn statuses_render_lowercase() {
    assert_eq!(DispatchStatus::Canceled.to_string(), "canceled");
    assert_eq!(serde_json::to_value(DispatchStatus::Error).expect("json"), json!("error"));
}
