//! Tracing setup for the `recall` binary.
//!
//! Everything goes to stderr so log lines never land between a question and
//! its prompt on stdout. `RUST_LOG`, when set, replaces the built-in filter.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
///
/// Quiet runs only report warnings such as skipped cards. Verbose runs add
/// debug output from the two recall crates and nothing from dependencies.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,recall_core=debug,recall=debug"
    } else {
        "warn"
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .without_time()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
