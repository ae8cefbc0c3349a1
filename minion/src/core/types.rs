//! Shared deterministic types for the agent runtime.
//!
//! These types define the contracts between the loop, the reasoning backend,
//! the action executor and the orchestrator channel. They carry no I/O and
//! serialize to the JSON shapes used on the wire.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unit of work assigned by the orchestrator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    /// Natural-language goal handed to the reasoning backend.
    pub goal: String,
    /// Canonical repository root all actions are confined to.
    pub repo_root: PathBuf,
    /// Maximum number of transcript entries before the task is aborted.
    pub step_budget: u32,
}

/// Operation proposed by the reasoning backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActionRequest {
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    RunCommand {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
    Finish {
        message: String,
    },
}

impl ActionRequest {
    /// Wire name of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionRequest::ReadFile { .. } => "read-file",
            ActionRequest::WriteFile { .. } => "write-file",
            ActionRequest::RunCommand { .. } => "run-command",
            ActionRequest::Finish { .. } => "finish",
        }
    }
}

/// Classification of a failed action, visible to the reasoning backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AccessDenied,
    NotFound,
    IoError,
    Timeout,
    SpawnError,
    ParseError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::AccessDenied => "access_denied",
            FailureKind::NotFound => "not_found",
            FailureKind::IoError => "io_error",
            FailureKind::Timeout => "timeout",
            FailureKind::SpawnError => "spawn_error",
            FailureKind::ParseError => "parse_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub kind: FailureKind,
    pub detail: String,
}

/// Outcome of executing (or failing to parse) one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    /// File content, command output, or a short confirmation.
    pub output: String,
    /// Exit code of a `run-command` that ran to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionFailure>,
}

impl ActionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            exit_code: None,
            error: None,
        }
    }

    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            exit_code: None,
            error: Some(ActionFailure {
                kind,
                detail: detail.into(),
            }),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Why a task was aborted rather than completed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    StepLimitExceeded,
}

/// Terminal result of a task, produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed { message: String },
    Failed { reason: String },
    Aborted { reason: AbortReason, step_budget: u32 },
}

impl TaskOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn step_limit(step_budget: u32) -> Self {
        TaskOutcome::Aborted {
            reason: AbortReason::StepLimitExceeded,
            step_budget,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Completed { message } => write!(f, "completed: {message}"),
            TaskOutcome::Failed { reason } => write!(f, "failed: {reason}"),
            TaskOutcome::Aborted { step_budget, .. } => {
                write!(f, "aborted: step limit of {step_budget} actions exceeded")
            }
        }
    }
}
