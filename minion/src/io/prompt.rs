//! Chat prompt builder for the reasoning backend.
//!
//! The goal and the full transcript are rendered on every call: a system
//! prompt (minijinja template), the goal as the first user message, then one
//! assistant/user pair per transcript entry.

use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::proposal::ACTION_SCHEMA;
use crate::core::transcript::{Proposal, Transcript, TranscriptEntry};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Builds chat messages, truncating each result's output to a byte budget.
pub struct PromptBuilder {
    env: Environment<'static>,
    result_limit_bytes: usize,
}

impl PromptBuilder {
    pub fn new(result_limit_bytes: usize) -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        Self {
            env,
            result_limit_bytes,
        }
    }

    pub fn build(&self, goal: &str, transcript: &Transcript) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2 + transcript.len() * 2);
        messages.push(ChatMessage::new(Role::System, self.render_system(transcript)));
        messages.push(ChatMessage::new(
            Role::User,
            format!("Your task is as follows:\n\n{}", goal.trim()),
        ));
        for entry in transcript.entries() {
            messages.push(ChatMessage::new(
                Role::Assistant,
                render_proposal(&entry.proposal),
            ));
            messages.push(ChatMessage::new(Role::User, self.render_result(entry)));
        }
        debug!(messages = messages.len(), "built prompt");
        messages
    }

    fn render_system(&self, transcript: &Transcript) -> String {
        let remaining = transcript
            .budget()
            .saturating_sub(transcript.len() as u32);
        let template = self
            .env
            .get_template("system")
            .expect("system template should be registered");
        template
            .render(context! {
                step_budget => transcript.budget(),
                remaining => remaining,
                schema => ACTION_SCHEMA.trim(),
            })
            .expect("system template rendering should not fail")
    }

    fn render_result(&self, entry: &TranscriptEntry) -> String {
        let result = &entry.result;
        let kind = entry
            .proposal
            .request()
            .map(|request| request.kind())
            .unwrap_or("unparsed reply");
        let mut buf = match &result.error {
            None if result.success => format!("Step {} ({kind}) succeeded.\n", entry.step),
            None => format!("Step {} ({kind}) completed unsuccessfully.\n", entry.step),
            Some(failure) => format!(
                "Step {} ({kind}) failed with {}: {}\n",
                entry.step,
                failure.kind.as_str(),
                failure.detail
            ),
        };
        if !result.output.is_empty() {
            buf.push('\n');
            buf.push_str(&truncate_utf8(&result.output, self.result_limit_bytes));
        }
        buf
    }
}

fn render_proposal(proposal: &Proposal) -> String {
    match proposal {
        Proposal::Action(request) => {
            serde_json::to_string(request).unwrap_or_else(|_| format!("{request:?}"))
        }
        Proposal::Malformed { raw } => raw.clone(),
    }
}

/// Keep at most `limit` bytes, cut on a char boundary, with a notice.
fn truncate_utf8(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n[truncated {} bytes]",
        &text[..cut],
        text.len() - cut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ActionRequest, ActionResult, FailureKind};

    fn transcript() -> Transcript {
        let mut transcript = Transcript::new(5);
        transcript
            .append(
                Proposal::Action(ActionRequest::ReadFile {
                    path: "a.txt".to_string(),
                }),
                ActionResult::ok("contents of a"),
            )
            .expect("append");
        transcript
            .append(
                Proposal::Malformed {
                    raw: "let me think".to_string(),
                },
                ActionResult::failed(FailureKind::ParseError, "reply is not json"),
            )
            .expect("append");
        transcript
    }

    #[test]
    fn messages_follow_goal_then_transcript_order() {
        let messages = PromptBuilder::new(1_000).build("add a README", &transcript());
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User
            ]
        );
        assert!(messages[1].content.contains("add a README"));
        assert_eq!(
            messages[2].content,
            r#"{"kind":"read-file","path":"a.txt"}"#
        );
        assert!(messages[3].content.contains("contents of a"));
        assert_eq!(messages[4].content, "let me think");
        assert!(messages[5].content.contains("parse_error"));
    }

    #[test]
    fn system_prompt_reports_remaining_budget_and_schema() {
        let messages = PromptBuilder::new(1_000).build("goal", &transcript());
        let system = &messages[0].content;
        assert!(system.contains("budget of 5 actions; 3 remain"), "{system}");
        assert!(system.contains("\"run-command\""));
    }

    #[test]
    fn long_outputs_are_truncated_on_char_boundaries() {
        assert_eq!(truncate_utf8("short", 10), "short");
        let text = "é".repeat(10);
        let cut = truncate_utf8(&text, 5);
        assert!(cut.starts_with("éé"));
        assert!(cut.contains("[truncated 16 bytes]"), "{cut}");
    }
}
