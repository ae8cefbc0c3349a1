//! Diagnostics via `tracing`, written to stderr.
//!
//! stdout may be the orchestrator channel, so nothing else writes there.
//! The filter comes from `RUST_LOG` and defaults to `warn`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=minion=debug minion --config minion.toml
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .init();
}
