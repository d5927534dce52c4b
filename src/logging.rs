//! Tracing setup for the CLI binary and for embedders that want the engine's
//! diagnostic spans without configuring `tracing-subscriber` themselves.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading `CCAUDIT_LOG` (falling back
/// to `RUST_LOG`, then `info`). Safe to call more than once; later calls are
/// no-ops once a subscriber is set.
pub fn init() {
    let filter = EnvFilter::try_from_env("CCAUDIT_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
