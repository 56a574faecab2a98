//! Telemetry — tracing initialization, metric registration, and the
//! in-memory statistics collaborator.
//!
//! Logging policy: no log field anywhere in this crate may carry message
//! content, matched substrings, or recognized entity values.  Entity
//! types, counts, offsets, confidences, request ids, model ids, and
//! client metadata are fair game.

pub mod metrics;
pub mod stats;

use tracing_subscriber::EnvFilter;

use crate::config::{GatewayConfig, LogFormat};

/// Initialize the global tracing subscriber from configuration.
///
/// `RUST_LOG` overrides the configured level when set, so operators can
/// raise verbosity per module without a config change.
pub fn init(config: &GatewayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));

    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Console => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
