//! End-to-end session tests over an in-memory channel.
//!
//! Each test feeds one task assignment frame, runs the real executor against a
//! scratch repository with a scripted backend, and inspects every frame the
//! agent sent back.

use std::path::Path;
use std::time::{Duration, Instant};

use minion::core::types::{ActionRequest, FailureKind, TaskOutcome};
use minion::io::backend::BridgeError;
use minion::io::codec::Message;
use minion::io::config::AgentConfig;
use minion::session::{SessionError, serve};
use minion::test_support::{
    ScriptedBackend, TestRepo, closing_transport, decode_frames, frames, memory_transport,
};

fn assignment(root: &Path, budget: u32) -> Vec<u8> {
    frames(&[Message::TaskAssignment {
        id: "task-1".to_string(),
        goal: "add README".to_string(),
        repo_root: root.display().to_string(),
        step_budget: Some(budget),
    }])
}

/// Run a session and return every frame the agent sent.
fn run(repo: &TestRepo, budget: u32, backend: &ScriptedBackend) -> Vec<Message> {
    let mut transport = memory_transport(assignment(repo.root(), budget));
    serve(&mut transport, backend, &AgentConfig::default()).expect("serve");
    let (_, outbound) = transport.into_parts();
    let sent = decode_frames(&outbound);
    let outcomes = sent
        .iter()
        .filter(|m| matches!(m, Message::TaskOutcome { .. }))
        .count();
    assert_eq!(outcomes, 1, "exactly one outcome frame");
    assert!(matches!(sent.last(), Some(Message::TaskOutcome { .. })));
    sent
}

fn outcome(sent: &[Message]) -> (&TaskOutcome, u32) {
    match sent.last() {
        Some(Message::TaskOutcome { outcome, steps, .. }) => (outcome, *steps),
        other => panic!("expected outcome, got {other:?}"),
    }
}

#[test]
fn readme_then_finish_completes() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new([
        Ok(ActionRequest::WriteFile {
            path: "README.md".to_string(),
            content: "hello".to_string(),
        }),
        Ok(ActionRequest::Finish {
            message: "done".to_string(),
        }),
    ]);

    let sent = run(&repo, 3, &backend);
    let (result, steps) = outcome(&sent);
    assert_eq!(
        result,
        &TaskOutcome::Completed {
            message: "done".to_string()
        }
    );
    assert_eq!(steps, 1);
    assert_eq!(sent.len(), 2);
    assert_eq!(repo.read("README.md").expect("read"), "hello");
}

#[test]
fn zero_budget_aborts_without_taking_a_step() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new((0..30).map(|i| {
        Ok(ActionRequest::WriteFile {
            path: format!("file-{i}.txt"),
            content: "x".to_string(),
        })
    }));

    let sent = run(&repo, 0, &backend);
    let (result, steps) = outcome(&sent);
    assert_eq!(result, &TaskOutcome::step_limit(0));
    assert_eq!(steps, 0);
    assert_eq!(sent.len(), 1);
    assert!(backend.transcript_lengths().is_empty());
    assert!(!repo.root().join("file-0.txt").exists());
}

#[test]
fn write_then_read_returns_written_content() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new([
        Ok(ActionRequest::WriteFile {
            path: "notes/todo.txt".to_string(),
            content: "line one\nline two\n".to_string(),
        }),
        Ok(ActionRequest::ReadFile {
            path: "notes/todo.txt".to_string(),
        }),
        Ok(ActionRequest::Finish {
            message: "ok".to_string(),
        }),
    ]);

    let sent = run(&repo, 5, &backend);
    match &sent[1] {
        Message::Progress { step, result, .. } => {
            assert_eq!(*step, 2);
            assert!(result.success);
            assert_eq!(result.output, "line one\nline two\n");
        }
        other => panic!("expected progress, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn command_timeout_then_budget_abort() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new([Ok(ActionRequest::RunCommand {
        command: "sleep 100".to_string(),
        timeout_secs: Some(1),
    })]);

    let start = Instant::now();
    let sent = run(&repo, 1, &backend);
    assert!(start.elapsed() < Duration::from_secs(30));

    match &sent[0] {
        Message::Progress { result, .. } => {
            assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FailureKind::Timeout));
        }
        other => panic!("expected progress, got {other:?}"),
    }
    let (result, steps) = outcome(&sent);
    assert_eq!(result, &TaskOutcome::step_limit(1));
    assert_eq!(steps, 1);
    assert_eq!(backend.transcript_lengths(), vec![0]);
}

#[test]
fn traversal_is_denied_and_nothing_is_written() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new([
        Ok(ActionRequest::ReadFile {
            path: "../../etc/passwd".to_string(),
        }),
        Ok(ActionRequest::WriteFile {
            path: "../escaped.txt".to_string(),
            content: "x".to_string(),
        }),
        Ok(ActionRequest::Finish {
            message: "tried".to_string(),
        }),
    ]);

    let sent = run(&repo, 5, &backend);
    for message in &sent[..2] {
        match message {
            Message::Progress { result, .. } => {
                assert_eq!(
                    result.error.as_ref().map(|e| e.kind),
                    Some(FailureKind::AccessDenied)
                );
            }
            other => panic!("expected progress, got {other:?}"),
        }
    }
    let parent = repo.root().parent().expect("parent");
    assert!(!parent.join("escaped.txt").exists());
}

#[test]
fn malformed_proposal_is_reported_and_recovered() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::from_replies([
        "Sure! First I'll inspect the repository.",
        "```json\n{\"kind\": \"finish\", \"message\": \"nothing to do\"}\n```",
    ]);

    let sent = run(&repo, 3, &backend);
    match &sent[0] {
        Message::Progress {
            request,
            raw,
            result,
            ..
        } => {
            assert!(request.is_none());
            assert_eq!(
                raw.as_deref(),
                Some("Sure! First I'll inspect the repository.")
            );
            assert_eq!(
                result.error.as_ref().map(|e| e.kind),
                Some(FailureKind::ParseError)
            );
        }
        other => panic!("expected progress, got {other:?}"),
    }
    let (result, steps) = outcome(&sent);
    assert!(result.is_completed());
    assert_eq!(steps, 1);
}

#[test]
fn backend_outage_fails_the_task() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new([Err(BridgeError::BackendUnavailable(
        "connection refused".to_string(),
    ))]);

    let sent = run(&repo, 3, &backend);
    let (result, steps) = outcome(&sent);
    assert!(matches!(result, TaskOutcome::Failed { reason } if reason.contains("connection refused")));
    assert_eq!(steps, 0);
}

#[cfg(unix)]
#[test]
fn failing_command_is_observed_not_fatal() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new([
        Ok(ActionRequest::RunCommand {
            command: "echo broken >&2; exit 2".to_string(),
            timeout_secs: None,
        }),
        Ok(ActionRequest::Finish {
            message: "saw failure".to_string(),
        }),
    ]);

    let sent = run(&repo, 3, &backend);
    match &sent[0] {
        Message::Progress { result, .. } => {
            assert!(!result.success);
            assert_eq!(result.exit_code, Some(2));
            assert!(result.output.contains("broken"));
        }
        other => panic!("expected progress, got {other:?}"),
    }
    assert!(outcome(&sent).0.is_completed());
}

#[test]
fn closed_channel_mid_task_stops_work() {
    let repo = TestRepo::new().expect("repo");
    let backend = ScriptedBackend::new([
        Ok(ActionRequest::WriteFile {
            path: "a.txt".to_string(),
            content: "a".to_string(),
        }),
        Ok(ActionRequest::WriteFile {
            path: "b.txt".to_string(),
            content: "b".to_string(),
        }),
    ]);
    let mut transport = closing_transport(assignment(repo.root(), 5));

    let err = serve(&mut transport, &backend, &AgentConfig::default()).unwrap_err();
    assert!(matches!(err, SessionError::Closed));
    assert_eq!(backend.transcript_lengths(), vec![0]);
    assert!(!repo.root().join("b.txt").exists());
}

#[test]
fn malformed_assignment_sends_nothing() {
    let mut inbound = Vec::new();
    let payload = br#"{"type":"task_assignment","id":"","goal":"g","repo_root":"/tmp"}"#;
    inbound.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    inbound.extend_from_slice(payload);
    let mut transport = memory_transport(inbound);

    let err = serve(&mut transport, ScriptedBackend::new([]), &AgentConfig::default()).unwrap_err();
    assert!(matches!(err, SessionError::Malformed(_)));
    assert!(transport.into_parts().1.is_empty());
}
