//! Tracing setup for the server binary.
//!
//! `RUST_LOG` wins over the configured filter when set. Output goes to
//! stderr, compact for local runs and JSON lines for log shippers.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let compact = (!json).then(|| fmt::layer().with_writer(std::io::stderr).compact());
    let structured = json.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(structured)
        .try_init();
}
