//! Deterministic, pure logic shared by the agent runtime.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod markdown;
pub mod path;
pub mod proposal;
pub mod transcript;
pub mod types;
