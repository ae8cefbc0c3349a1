//! Append-only record of the actions taken for one task.

use serde::Serialize;

use crate::core::types::{ActionRequest, ActionResult};

/// What the reasoning backend proposed for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Proposal {
    Action(ActionRequest),
    /// Reply that could not be mapped to a known action kind.
    Malformed { raw: String },
}

impl Proposal {
    pub fn request(&self) -> Option<&ActionRequest> {
        match self {
            Proposal::Action(request) => Some(request),
            Proposal::Malformed { .. } => None,
        }
    }
}

/// One (proposal, result) pair. `step` is 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub step: u32,
    pub proposal: Proposal,
    pub result: ActionResult,
}

/// Returned by [`Transcript::append`] when the step budget is already used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("step budget of {budget} actions exhausted")]
pub struct BudgetExhausted {
    pub budget: u32,
}

/// Ordered history of a task. Its length never exceeds the step budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    budget: u32,
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            entries: Vec::new(),
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.entries.len() >= self.budget as usize
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Append a pair, assigning the next step number.
    pub fn append(
        &mut self,
        proposal: Proposal,
        result: ActionResult,
    ) -> Result<&TranscriptEntry, BudgetExhausted> {
        if self.is_exhausted() {
            return Err(BudgetExhausted {
                budget: self.budget,
            });
        }
        let step = self.entries.len() as u32 + 1;
        self.entries.push(TranscriptEntry {
            step,
            proposal,
            result,
        });
        Ok(&self.entries[self.entries.len() - 1])
    }
}
