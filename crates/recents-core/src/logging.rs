use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "RECENTS_LOG";

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs a global fmt subscriber filtered by `RECENTS_LOG`.
///
/// Returns `false` when a subscriber was already installed; calling this more
/// than once is harmless.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
