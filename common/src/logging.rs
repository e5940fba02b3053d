use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "COURIER_LOG";

/// Installs the global fmt subscriber. The filter is read from `COURIER_LOG`
/// and defaults to `info`.
///
/// Logs always go to stderr: the bridge uses stdout as its message channel.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
