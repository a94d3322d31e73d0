//! Helpers related to tracing, used by main entrypoints

use tracing_subscriber::EnvFilter;

/// The filter used when `RUST_LOG` is unset or unparseable.
const DEFAULT_FILTER: &str = "info";

/// Initialize tracing with the default configuration.
///
/// Output goes to stderr so it never mixes with anything an action prints
/// on stdout.
pub fn initialize_tracing() {
    // Don't include timestamps and such because they're not really useful and
    // too verbose; recovery logs are already captured with timestamps.
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .event_format(format)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
