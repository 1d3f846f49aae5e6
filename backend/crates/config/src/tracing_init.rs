use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber for the syncer process.
///
/// `RUST_LOG` wins over `LOG_LEVEL`; `default_level` applies when neither is set.
/// Calling this twice is harmless: the second subscriber is discarded.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
