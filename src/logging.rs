//! Tracing setup for the command-line tool
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary.

/// Initialize tracing output on stderr
///
/// Call early in main() before any logging occurs.
/// `RUST_LOG` overrides the level chosen by `verbose`.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}
