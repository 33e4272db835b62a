//! Default `tracing` subscriber setup.
//!
//! The library only emits events; binaries and tests opt into output by
//! calling one of these once at startup. `RUST_LOG` takes precedence over the
//! supplied filter.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Installs a compact stderr formatter at `info` level.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_default() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

pub fn init_with_filter(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
