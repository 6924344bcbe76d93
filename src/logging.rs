//! `tracing` subscriber setup for binaries embedding the session engine.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber. `RUST_LOG` wins over `default_filter`.
/// Calling it again (or after another subscriber is set) is a no-op.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
