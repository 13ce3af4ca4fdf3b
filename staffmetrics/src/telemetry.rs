//! Log subscriber setup for binaries and demos embedding the engine.

use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "STAFFMETRICS_LOG";

/// Install a fmt subscriber filtered by `STAFFMETRICS_LOG`, then `RUST_LOG`,
/// then `info`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("tracing subscriber installed");
    }
}
