//! One task per process: receive the assignment, run it, report the outcome.

use std::ops::ControlFlow;
use std::path::Path;

use tracing::{debug, error, info, instrument, warn};

use crate::agent_loop::AgentLoop;
use crate::core::types::{Task, TaskOutcome};
use crate::io::backend::ReasoningBackend;
use crate::io::codec::{self, CodecError, Message};
use crate::io::config::{AgentConfig, GitConfig};
use crate::io::executor::RepoExecutor;
use crate::io::git::{CommitSummary, Git, Identity};
use crate::io::transport::{Transport, TransportError};

/// What was reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
    pub steps: u32,
    pub commit: Option<String>,
    pub changed_files: Vec<String>,
}

/// Failures that leave the orchestrator without an outcome.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("orchestrator channel closed")]
    Closed,
    #[error("invalid task assignment: {0}")]
    Malformed(String),
    #[error(transparent)]
    Transport(TransportError),
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Malformed(detail) => SessionError::Malformed(detail),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => SessionError::Closed,
            other => SessionError::Transport(other),
        }
    }
}

struct Assignment {
    id: String,
    goal: String,
    repo_root: String,
    step_budget: Option<u32>,
}

/// Serve exactly one task over `transport`.
///
/// Once an assignment has been decoded the orchestrator always gets exactly
/// one `task_outcome` frame, unless the channel itself is gone.
#[instrument(skip_all)]
pub fn serve<T, B>(
    transport: &mut T,
    backend: B,
    config: &AgentConfig,
) -> Result<SessionReport, SessionError>
where
    T: Transport + ?Sized,
    B: ReasoningBackend,
{
    let assignment = receive_assignment(transport)?;
    info!(task_id = %assignment.id, "task received");

    let report = run_assignment(transport, backend, config, assignment);

    let outcome = Message::TaskOutcome {
        task_id: report.task_id.clone(),
        steps: report.steps,
        outcome: report.outcome.clone(),
        commit: report.commit.clone(),
        changed_files: report.changed_files.clone(),
    };
    transport.send(&codec::encode(&outcome)).map_err(|err| {
        error!(err = %err, "failed to deliver task outcome");
        SessionError::from(err)
    })?;
    info!(task_id = %report.task_id, outcome = %report.outcome, "task outcome delivered");
    Ok(report)
}

fn receive_assignment<T: Transport + ?Sized>(transport: &mut T) -> Result<Assignment, SessionError> {
    let bytes = transport.receive().map_err(|err| match err {
        TransportError::FrameTooLarge { .. } => SessionError::Malformed(err.to_string()),
        other => SessionError::from(other),
    })?;
    match codec::decode(&bytes)? {
        Message::TaskAssignment {
            id,
            goal,
            repo_root,
            step_budget,
        } => Ok(Assignment {
            id,
            goal,
            repo_root,
            step_budget,
        }),
        other => Err(SessionError::Malformed(format!(
            "expected task_assignment, got {}",
            other.type_name()
        ))),
    }
}

fn run_assignment<T, B>(
    transport: &mut T,
    backend: B,
    config: &AgentConfig,
    assignment: Assignment,
) -> SessionReport
where
    T: Transport + ?Sized,
    B: ReasoningBackend,
{
    let executor = match RepoExecutor::new(Path::new(&assignment.repo_root), config.command_limits()) {
        Ok(executor) => executor,
        Err(err) => {
            warn!(repo_root = %assignment.repo_root, err = %err, "repository root unusable");
            return SessionReport {
                task_id: assignment.id,
                outcome: TaskOutcome::failed(format!(
                    "repository root '{}' is unusable: {err}",
                    assignment.repo_root
                )),
                steps: 0,
                commit: None,
                changed_files: Vec::new(),
            };
        }
    };

    let task = Task {
        id: assignment.id,
        goal: assignment.goal,
        repo_root: executor.root().to_path_buf(),
        step_budget: config.step_budget(assignment.step_budget),
    };

    let agent = AgentLoop::new(config.loop_config(), backend, &executor);
    let report = agent.run_observed(&task, |entry| {
        match transport.send(&codec::encode(&Message::progress(&task.id, entry))) {
            Ok(()) => ControlFlow::Continue(()),
            Err(TransportError::Closed) => {
                ControlFlow::Break("orchestrator channel closed".to_string())
            }
            Err(err) => {
                warn!(err = %err, step = entry.step, "progress notification dropped");
                ControlFlow::Continue(())
            }
        }
    });

    let summary = if report.outcome.is_completed() && config.git.commit_on_complete {
        record_changes(&task.repo_root, &config.git)
    } else {
        CommitSummary {
            commit: None,
            changed_files: Vec::new(),
        }
    };

    SessionReport {
        task_id: task.id,
        outcome: report.outcome,
        steps: report.transcript.len() as u32,
        commit: summary.commit,
        changed_files: summary.changed_files,
    }
}

/// Commit everything the task changed. Git problems never change the outcome.
fn record_changes(root: &Path, config: &GitConfig) -> CommitSummary {
    let git = Git::new(root).with_identity(Identity {
        name: config.user_name.clone(),
        email: config.user_email.clone(),
    });
    let empty = CommitSummary {
        commit: None,
        changed_files: Vec::new(),
    };
    if !git.is_work_tree() {
        debug!(root = %root.display(), "not a git work tree, skipping commit");
        return empty;
    }
    match git.commit_all(&config.commit_message) {
        Ok(summary) => summary,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "failed to commit task changes");
            empty
        }
    }
}
