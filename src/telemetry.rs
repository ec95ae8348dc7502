//! Tracing subscriber setup.

use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default subscriber: env-filterable fmt layer plus span-trace
/// capture for miette reports.
///
/// Filter defaults to `error,worldloom=info` and is overridden through
/// `RUST_LOG`. Safe to call once per process; a second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("error,worldloom=info"))
        .unwrap_or_else(|_| EnvFilter::new("error"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_span_events(FmtSpan::CLOSE))
        .with(ErrorLayer::default())
        .try_init();
}
