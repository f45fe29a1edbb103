//! facesync applications
//!
//! Runs the companion and wearable ends of the preference sync as
//! processes talking through a small WebSocket relay.

pub mod config;
pub mod relay;
pub mod transport;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing. `RUST_LOG` overrides `default_filter`.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
