//! Agent configuration loaded from an optional TOML file.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent_loop::LoopConfig;
use crate::io::executor::CommandLimits;

pub const ENV_API_BASE_URL: &str = "MINION_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "MINION_API_TOKEN";
pub const ENV_MODEL: &str = "MINION_MODEL";

/// Agent configuration (TOML).
///
/// Missing fields default to the values below; a missing file is the same
/// as an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Step budget used when the task assignment omits one.
    pub step_budget_default: u32,

    /// Assignment budgets are clamped to this.
    pub max_step_budget: u32,

    /// Default timeout for `run-command` actions.
    pub command_timeout_secs: u64,

    /// Per-action timeouts are clamped to this.
    pub max_command_timeout_secs: u64,

    /// Per-stream capture limit for command stdout/stderr.
    pub command_output_limit_bytes: usize,

    /// Largest inbound frame accepted from the orchestrator.
    pub max_frame_bytes: u32,

    pub backend: BackendConfig,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    /// Each action result is truncated to this many bytes in prompts.
    pub result_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    pub commit_on_complete: bool,
    pub commit_message: String,
    pub user_name: String,
    pub user_email: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_budget_default: 30,
            max_step_budget: 200,
            command_timeout_secs: 120,
            max_command_timeout_secs: 15 * 60,
            command_output_limit_bytes: 100_000,
            max_frame_bytes: 16 * 1024 * 1024,
            backend: BackendConfig::default(),
            git: GitConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_token: None,
            timeout_secs: 120,
            temperature: 0.0,
            result_limit_bytes: 20_000,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            commit_on_complete: true,
            commit_message: "Commit from minion".to_string(),
            user_name: "minion".to_string(),
            user_email: "minion@localhost".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.step_budget_default == 0 {
            return Err(anyhow!("step_budget_default must be > 0"));
        }
        if self.max_step_budget < self.step_budget_default {
            return Err(anyhow!("max_step_budget must be >= step_budget_default"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.max_command_timeout_secs < self.command_timeout_secs {
            return Err(anyhow!(
                "max_command_timeout_secs must be >= command_timeout_secs"
            ));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        if self.max_frame_bytes == 0 {
            return Err(anyhow!("max_frame_bytes must be > 0"));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(anyhow!("backend.base_url must be non-empty"));
        }
        if self.backend.model.trim().is_empty() {
            return Err(anyhow!("backend.model must be non-empty"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        if self.backend.result_limit_bytes == 0 {
            return Err(anyhow!("backend.result_limit_bytes must be > 0"));
        }
        if self.git.commit_message.trim().is_empty() {
            return Err(anyhow!("git.commit_message must be non-empty"));
        }
        Ok(())
    }

    /// Budget for a task: the requested one (or the default when absent), at most
    /// `max_step_budget`. An explicit zero stays zero.
    pub fn step_budget(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.step_budget_default)
            .min(self.max_step_budget)
    }

    pub fn command_limits(&self) -> CommandLimits {
        CommandLimits {
            default_timeout: Duration::from_secs(self.command_timeout_secs),
            max_timeout: Duration::from_secs(self.max_command_timeout_secs),
            output_limit_bytes: self.command_output_limit_bytes,
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_step_budget: self.max_step_budget,
        }
    }

    /// Apply `MINION_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            debug!(%url, "backend base url overridden from environment");
            self.backend.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.backend.api_token = Some(token);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            debug!(%model, "backend model overridden from environment");
            self.backend.model = model;
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
