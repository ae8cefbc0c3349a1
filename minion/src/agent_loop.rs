//! The agent loop: decide, act, record, until finish or the budget runs out.
//!
//! The loop is the only owner of the [`Transcript`]. Every environment change
//! goes through the [`Executor`]; every decision comes from the
//! [`ReasoningBackend`]. Both are injected, so the loop runs unchanged against
//! scripted fakes in tests.

use std::ops::ControlFlow;

use tracing::{debug, info, instrument, warn};

use crate::core::transcript::{Proposal, Transcript, TranscriptEntry};
use crate::core::types::{ActionRequest, ActionResult, FailureKind, Task, TaskOutcome};
use crate::io::backend::{BridgeError, ReasoningBackend};
use crate::io::executor::Executor;

/// Explicit loop configuration, derived from `AgentConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Task budgets above this are clamped.
    pub max_step_budget: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_step_budget: 200,
        }
    }
}

/// Terminal outcome plus the transcript that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    pub outcome: TaskOutcome,
    pub transcript: Transcript,
}

pub struct AgentLoop<B, E> {
    config: LoopConfig,
    backend: B,
    executor: E,
}

impl<B: ReasoningBackend, E: Executor> AgentLoop<B, E> {
    pub fn new(config: LoopConfig, backend: B, executor: E) -> Self {
        Self {
            config,
            backend,
            executor,
        }
    }

    pub fn run(&self, task: &Task) -> TaskOutcome {
        self.run_observed(task, |_| ControlFlow::Continue(())).outcome
    }

    /// Run the task, calling `on_step` after every appended transcript entry.
    ///
    /// `ControlFlow::Break(reason)` from the observer ends the task as failed.
    #[instrument(skip_all, fields(task_id = %task.id, step_budget = task.step_budget))]
    pub fn run_observed<F>(&self, task: &Task, mut on_step: F) -> LoopReport
    where
        F: FnMut(&TranscriptEntry) -> ControlFlow<String>,
    {
        let budget = task.step_budget.min(self.config.max_step_budget);
        if budget < task.step_budget {
            warn!(
                requested = task.step_budget,
                budget, "step budget clamped to configured maximum"
            );
        }
        let mut transcript = Transcript::new(budget);

        let outcome = loop {
            if transcript.is_exhausted() {
                info!(budget, "step budget exhausted");
                break TaskOutcome::step_limit(budget);
            }

            let (proposal, result) = match self.backend.decide(&task.goal, &transcript) {
                Ok(ActionRequest::Finish { message }) => {
                    info!(steps = transcript.len(), "task finished");
                    break TaskOutcome::Completed { message };
                }
                Ok(request) => {
                    let result = self.dispatch(&request);
                    (Proposal::Action(request), result)
                }
                Err(BridgeError::Parse(err)) => {
                    warn!(reason = %err.reason, "malformed proposal");
                    (
                        Proposal::Malformed { raw: err.raw },
                        ActionResult::failed(FailureKind::ParseError, err.reason),
                    )
                }
                Err(err @ BridgeError::BackendUnavailable(_)) => {
                    warn!(err = %err, "reasoning backend unavailable");
                    break TaskOutcome::failed(err.to_string());
                }
            };

            let entry = match transcript.append(proposal, result) {
                Ok(entry) => entry,
                Err(exhausted) => break TaskOutcome::step_limit(exhausted.budget),
            };
            if let ControlFlow::Break(reason) = on_step(entry) {
                warn!(%reason, "observer stopped the task");
                break TaskOutcome::failed(reason);
            }
        };

        LoopReport {
            outcome,
            transcript,
        }
    }

    fn dispatch(&self, request: &ActionRequest) -> ActionResult {
        debug!(kind = request.kind(), "dispatching action");
        match self.executor.execute(request) {
            Ok(result) => result,
            Err(err) => {
                debug!(err = %err, "action failed");
                err.into_result()
            }
        }
    }
}
