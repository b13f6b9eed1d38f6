//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Preferred filter variable; `RUST_LOG` is consulted when it is unset.
pub const LOG_ENV: &str = "FILEMERGE_LOG";

/// Install the global subscriber writing to stderr. Later calls are no-ops.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}
