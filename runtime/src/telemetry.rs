use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "WAYMARK_LOG";

/// Filter from `WAYMARK_LOG`, or `default_directive` when unset or invalid.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a stdout subscriber for development.
///
/// Returns `false` when a global subscriber was already set.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .try_init()
        .is_ok()
}
