//! Log output setup.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "promobatch=info";

/// Installs a `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` overrides the default `promobatch=info` filter. Calling this
/// more than once is harmless.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
