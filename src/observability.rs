//! Logging setup and span helpers.
//!
//! Deployment progress is reported as structured `tracing` events (mostly by
//! [`LogWriter`](crate::LogWriter)); this module installs the global subscriber
//! and provides the spans watchers and setups run under.

use std::sync::Once;

use serde::Deserialize;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines, for CI systems that ingest structured logs.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Safe to call more
/// than once; later calls (or an already installed subscriber) are no-ops.
///
/// ```rust
/// use beanstalk_deployer::{init_tracing, LogFormat};
///
/// init_tracing(LogFormat::Pretty);
/// ```
pub fn init_tracing(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let installed = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init(),
        };
        if installed.is_err() {
            tracing::debug!("global tracing subscriber already installed");
        }
    });
}

/// Span for one environment watcher.
#[must_use]
pub fn watcher_span(application: &str, environment: &str, version_label: &str) -> Span {
    tracing::info_span!(
        "watcher",
        app = application,
        env = environment,
        version = version_label,
    )
}

/// Span for one setup of a deployment.
#[must_use]
pub fn setup_span(kind: &str, application: &str) -> Span {
    tracing::info_span!("setup", kind = kind, app = application)
}
