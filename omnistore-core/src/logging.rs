//! Tracing subscriber bootstrap.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops. Intended for binaries
/// and test harnesses; libraries only emit events.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
