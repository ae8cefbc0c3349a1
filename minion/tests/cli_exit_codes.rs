//! CLI tests for the `minion` binary.
//!
//! Spawns the binary with a prepared stdin and verifies the exit code and
//! that nothing but frames ever reaches stdout.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use minion::exit_codes;
use minion::io::codec::Message;
use minion::test_support::{decode_frames, frames};

fn run_minion(dir: &Path, stdin: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_minion"))
        .current_dir(dir)
        .env_remove("MINION_API_BASE_URL")
        .env_remove("MINION_API_TOKEN")
        .env_remove("MINION_MODEL")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn minion");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(stdin)
        .expect("write stdin");
    child.wait_with_output().expect("wait minion")
}

#[test]
fn malformed_assignment_exits_with_malformed_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let payload = b"{\"type\":\"task_assignment\",\"goal\":\"no id\"}";
    let mut stdin = (payload.len() as u32).to_be_bytes().to_vec();
    stdin.extend_from_slice(payload);

    let output = run_minion(temp.path(), &stdin);
    assert_eq!(output.status.code(), Some(exit_codes::MALFORMED));
    assert!(output.stdout.is_empty());
}

#[test]
fn empty_channel_exits_with_closed_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_minion(temp.path(), b"");
    assert_eq!(output.status.code(), Some(exit_codes::CLOSED));
}

#[test]
fn invalid_config_exits_with_startup_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("minion.toml"), "step_budget_default = 0\n").expect("write");
    let output = run_minion(temp.path(), b"");
    assert_eq!(output.status.code(), Some(exit_codes::STARTUP));
    assert!(String::from_utf8_lossy(&output.stderr).contains("step_budget_default"));
}

#[test]
fn unusable_repo_root_still_reports_one_outcome() {
    let temp = tempfile::tempdir().expect("tempdir");
    let stdin = frames(&[Message::TaskAssignment {
        id: "t-9".to_string(),
        goal: "anything".to_string(),
        repo_root: temp.path().join("missing").display().to_string(),
        step_budget: None,
    }]);

    let output = run_minion(temp.path(), &stdin);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let sent = decode_frames(&output.stdout);
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Message::TaskOutcome {
            task_id, outcome, ..
        } => {
            assert_eq!(task_id, "t-9");
            assert!(!outcome.is_completed());
        }
        other => panic!("expected outcome, got {other:?}"),
    }
}
