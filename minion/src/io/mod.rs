//! Side-effecting adapters: transport, codec, filesystem, processes, git, network.

pub mod backend;
pub mod codec;
pub mod config;
pub mod executor;
pub mod git;
pub mod process;
pub mod prompt;
pub mod transport;
