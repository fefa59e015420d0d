//! # Observability
//!
//! Structured logging for driftsync using the tracing ecosystem.
//!
//! Secret values never reach the log layer: sinks log variable names and
//! kinds only, and dry-run previews go through `SecretValue::masked()`.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// The filter honors `RUST_LOG`, falling back to the supplied level for the
/// crate and `warn` for everything else. `json` switches the output to
/// newline-delimited JSON for machine consumption.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,driftsync={}", level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
