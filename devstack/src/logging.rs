//! Diagnostic tracing for devstack.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is separate
//! from the `==>` progress lines on stdout and from the per-step command logs
//! under `.devstack/logs/`, which are always written.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=devstack=debug devstack up
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
