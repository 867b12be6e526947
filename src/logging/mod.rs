// Tracing setup for the binary
//
// RUST_LOG wins when set; otherwise `paperbanana=info` (or `debug` with
// --verbose). Logs go to stderr so stdout stays clean for the run summary.

use tracing_subscriber::EnvFilter;

/// Default filter directive.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "paperbanana=debug"
    } else {
        "paperbanana=info"
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "paperbanana=info");
        assert_eq!(default_directive(true), "paperbanana=debug");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_tracing(false);
        init_tracing(true);
    }
}
