//! Tracing subscriber setup for binaries and workers
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the process embedding statebus.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a stderr fmt subscriber.
///
/// `RUST_LOG` wins over `level` when set. Returns `false` when a global
/// subscriber was already installed, which is not an error.
pub fn init_logging(level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("statebus={level}")));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
