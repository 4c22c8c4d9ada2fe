//! Tracing setup helpers, mirroring the teacher's `tracing-subscriber` init.

use tracing_subscriber::EnvFilter;

/// Initialize a global `tracing` subscriber from `RUST_LOG` (default `info`).
///
/// Safe to call more than once per process (subsequent calls are no-ops);
/// callers are typically the CLI binary's `main` and individual test
/// modules that want readable output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
