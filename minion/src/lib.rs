//! Single-task coding agent runtime.
//!
//! An orchestrator hands the agent one task over a framed channel. The agent
//! repeatedly asks a reasoning backend for the next action, executes it
//! against the repository, and feeds the result back, until the backend
//! finishes or the step budget runs out. Exactly one outcome is reported.
//!
//! - **[`core`]**: pure, deterministic logic (types, transcript, proposal parsing,
//!   path confinement).
//! - **[`io`]**: side-effecting adapters (transport, codec, executor, backend, git).
//!
//! [`agent_loop`] drives a task; [`session`] wires it to the orchestrator channel.

pub mod agent_loop;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
