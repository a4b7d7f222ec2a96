//! Logging initialization (§6 ambient stack): `tracing` + `tracing-subscriber`
//! with an env-filter, JSON output in production and pretty output for local
//! development, matching the teacher's own `tracing_subscriber` setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Output shape for the process log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Newline-delimited JSON, for ingestion by a log pipeline.
    Json,
    /// Human-readable, for local development.
    Pretty,
}

/// Installs the global `tracing` subscriber. Panics if a subscriber is
/// already installed; callers invoke this exactly once at process start.
pub fn init(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json());
            subscriber.init();
        }
        LogFormat::Pretty => {
            let subscriber = Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty());
            subscriber.init();
        }
    }
}
