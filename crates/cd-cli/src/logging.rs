//! Tracing setup for the binary

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Log to stderr, filtered by `RUST_LOG` (default `info`)
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
