//! Stable process exit codes for the `minion` binary.

/// A terminal task outcome was delivered (whatever the outcome itself was).
pub const OK: i32 = 0;
/// Startup failed: bad configuration, unusable channel, or another error.
pub const STARTUP: i32 = 1;
/// The inbound task assignment was malformed.
pub const MALFORMED: i32 = 3;
/// The orchestrator channel closed before the outcome could be delivered.
pub const CLOSED: i32 = 4;
