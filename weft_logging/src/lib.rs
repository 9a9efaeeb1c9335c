//! Logging setup shared by the weft crates and their test suites.
//!
//! Library code logs through the `log` facade under `target: "weft"`. The
//! subscriber installed here picks those records up alongside native
//! `tracing` events. `RUST_LOG` overrides the filter; without it only warnings,
//! plus weft's own lifecycle events at info, are shown.
pub use tracing::{self, debug, error, info, instrument, trace, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// The filter used when `RUST_LOG` is unset or cannot be parsed
pub const DEFAULT_DIRECTIVES: &str = "warn,weft=info";

/// Sets up the logging for any crate. A panic on any thread is logged and ends the process
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        error!(target: "weft", "Panic occurred: {}", info);
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Installs the subscriber without touching the panic hook. Tests that assert on panics use this
pub fn setup_log_no_panic_hook() {
    let _ = SubscriberBuilder::default()
        .with_line_number(true)
        .with_file(true)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(env_filter())
        .finish()
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
