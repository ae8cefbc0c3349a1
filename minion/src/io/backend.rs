//! Reasoning bridge: asks the AI backend for the next action.
//!
//! The [`ReasoningBackend`] trait is the only seam the agent loop sees, so
//! tests substitute scripted backends without any network. [`HttpBackend`]
//! talks to an OpenAI-compatible `/chat/completions` endpoint. No retries
//! happen here; recovery is the agent loop's job.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::proposal::{ACTION_SCHEMA, ProposalError, ProposalParser};
use crate::core::transcript::Transcript;
use crate::core::types::ActionRequest;
use crate::io::config::BackendConfig;
use crate::io::prompt::{ChatMessage, PromptBuilder};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The backend could not be reached or refused the request. Task-fatal.
    #[error("reasoning backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The reply could not be mapped to an action. Recoverable.
    #[error("unparseable proposal: {0}")]
    Parse(#[from] ProposalError),
}

/// Pluggable decision capability.
pub trait ReasoningBackend {
    /// Propose the next action given the goal and everything done so far.
    fn decide(&self, goal: &str, transcript: &Transcript) -> Result<ActionRequest, BridgeError>;
}

impl<B: ReasoningBackend + ?Sized> ReasoningBackend for &B {
    fn decide(&self, goal: &str, transcript: &Transcript) -> Result<ActionRequest, BridgeError> {
        (**self).decide(goal, transcript)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Backend speaking the OpenAI-compatible chat completions API.
pub struct HttpBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_token: Option<String>,
    temperature: f32,
    prompt: PromptBuilder,
    parser: ProposalParser,
    response_format: Value,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        let schema: Value =
            serde_json::from_str(ACTION_SCHEMA).context("parse embedded action schema")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            api_token: config.api_token.clone(),
            temperature: config.temperature,
            prompt: PromptBuilder::new(config.result_limit_bytes),
            parser: ProposalParser::new(),
            response_format: serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "action", "schema": schema },
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, BridgeError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            response_format: self.response_format.clone(),
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|err| BridgeError::BackendUnavailable(describe(&err)))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| BridgeError::BackendUnavailable(describe(&err)))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "backend returned error status");
            return Err(BridgeError::BackendUnavailable(format!(
                "http {status}: {}",
                text.trim()
            )));
        }

        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|err| {
            BridgeError::Parse(ProposalError {
                reason: format!("malformed completion response: {err}"),
                raw: text.clone(),
            })
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                BridgeError::Parse(ProposalError {
                    reason: "missing completion in response".to_string(),
                    raw: text,
                })
            })
    }
}

impl ReasoningBackend for HttpBackend {
    #[instrument(skip_all, fields(model = %self.model, steps = transcript.len()))]
    fn decide(&self, goal: &str, transcript: &Transcript) -> Result<ActionRequest, BridgeError> {
        let messages = self.prompt.build(goal, transcript);
        let completion = self.complete(&messages)?;
        debug!(bytes = completion.len(), "received completion");
        Ok(self.parser.parse(&completion)?)
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
