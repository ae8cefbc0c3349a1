//! Protocol codec: wire messages exchanged with the orchestrator.
//!
//! Each frame payload is one JSON object discriminated by `"type"`. Decoding
//! never panics; every shape or semantic violation is a [`CodecError`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::transcript::{Proposal, TranscriptEntry};
use crate::core::types::{ActionRequest, ActionResult, TaskOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Inbound: the single task this agent instance works on.
    TaskAssignment {
        id: String,
        goal: String,
        repo_root: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_budget: Option<u32>,
    },
    /// Outbound, best effort: one per transcript entry.
    Progress {
        task_id: String,
        step: u32,
        request: Option<ActionRequest>,
        raw: Option<String>,
        result: ActionResult,
    },
    /// Outbound, exactly once per task.
    TaskOutcome {
        task_id: String,
        steps: u32,
        outcome: TaskOutcome,
        commit: Option<String>,
        #[serde(default)]
        changed_files: Vec<String>,
    },
}

impl Message {
    pub fn progress(task_id: &str, entry: &TranscriptEntry) -> Self {
        let (request, raw) = match &entry.proposal {
            Proposal::Action(request) => (Some(request.clone()), None),
            Proposal::Malformed { raw } => (None, Some(raw.clone())),
        };
        Message::Progress {
            task_id: task_id.to_string(),
            step: entry.step,
            request,
            raw,
            result: entry.result.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Message::TaskAssignment { .. } => "task_assignment",
            Message::Progress { .. } => "progress",
            Message::TaskOutcome { .. } => "task_outcome",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(String),
}

pub fn encode(message: &Message) -> Vec<u8> {
    // Every field is a string, integer or plain enum; serialization cannot fail.
    serde_json::to_vec(message).expect("wire messages always serialize")
}

pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let message: Message =
        serde_json::from_slice(bytes).map_err(|err| CodecError::Malformed(err.to_string()))?;
    check(&message)?;
    Ok(message)
}

fn check(message: &Message) -> Result<(), CodecError> {
    if let Message::TaskAssignment {
        id,
        goal,
        repo_root,
        ..
    } = message
    {
        if id.trim().is_empty() {
            return Err(CodecError::Malformed("task id is empty".to_string()));
        }
        if goal.trim().is_empty() {
            return Err(CodecError::Malformed("goal is empty".to_string()));
        }
        if !Path::new(repo_root).is_absolute() {
            return Err(CodecError::Malformed(format!(
                "repo_root '{repo_root}' is not an absolute path"
            )));
        }
    }
    Ok(())
}
