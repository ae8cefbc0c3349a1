//! Mapping of raw reasoning-backend replies onto [`ActionRequest`]s.

use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::debug;

use crate::core::markdown::strip_wrapping_code_fences;
use crate::core::types::ActionRequest;

/// JSON schema every action proposal must satisfy.
pub const ACTION_SCHEMA: &str = include_str!("../../schemas/action.schema.json");

const KNOWN_KINDS: [&str; 4] = ["read-file", "write-file", "run-command", "finish"];

/// A reply that cannot be mapped to a known action kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ProposalError {
    pub reason: String,
    /// The reply exactly as the backend sent it.
    pub raw: String,
}

/// Validates replies against [`ACTION_SCHEMA`] and decodes them.
pub struct ProposalParser {
    validator: Validator,
}

impl ProposalParser {
    pub fn new() -> Self {
        let schema: Value =
            serde_json::from_str(ACTION_SCHEMA).expect("embedded action schema should be json");
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .expect("embedded action schema should compile");
        Self { validator }
    }

    /// Parse one reply. Wrapping code fences are tolerated.
    pub fn parse(&self, raw: &str) -> Result<ActionRequest, ProposalError> {
        let fail = |reason: String| ProposalError {
            reason,
            raw: raw.to_string(),
        };

        let body = strip_wrapping_code_fences(raw);
        let body = body.trim();
        if body.is_empty() {
            return Err(fail("empty reply".to_string()));
        }

        let value: Value =
            serde_json::from_str(body).map_err(|err| fail(format!("reply is not json: {err}")))?;

        match value.get("kind") {
            Some(Value::String(kind)) if !KNOWN_KINDS.contains(&kind.as_str()) => {
                return Err(fail(format!(
                    "unknown action kind '{kind}' (expected one of: {})",
                    KNOWN_KINDS.join(", ")
                )));
            }
            Some(Value::String(_)) => {}
            Some(_) => return Err(fail("field 'kind' must be a string".to_string())),
            None if value.is_object() => {
                return Err(fail("missing field 'kind'".to_string()));
            }
            None => return Err(fail("reply must be a json object".to_string())),
        }

        let violations: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            debug!(count = violations.len(), "proposal failed schema validation");
            return Err(fail(format!(
                "proposal does not match the action schema:\n- {}",
                violations.join("\n- ")
            )));
        }

        serde_json::from_value(value).map_err(|err| fail(format!("decode proposal: {err}")))
    }
}

impl Default for ProposalParser {
    fn default() -> Self {
        Self::new()
    }
}
