//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for embedding applications and tests
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - A second initialization is reported as an error, never a panic

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install a global fmt subscriber filtered by `config.log_level`.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("secure_listener={}", config.log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
