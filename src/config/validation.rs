//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, timeouts bounded, version bounds ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::schema::Config;

/// Longest handshake read deadline accepted, in milliseconds.
pub const MAX_HANDSHAKE_TIMEOUT_MS: u64 = 60_000;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("listener.max_handshakes must be between 1 and {max}, got {got}")]
    MaxHandshakes { got: usize, max: usize },

    #[error("listener.handshake_timeout_ms must be greater than zero")]
    HandshakeTimeout,

    #[error("listener.handshake_timeout_ms must be at most {max}, got {got}")]
    MaxHandshakeTimeout { got: u64, max: u64 },

    #[error("handshake.min_version {min} exceeds handshake.max_version {max}")]
    VersionBounds { min: u8, max: u8 },

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    LogLevel(String),
}

pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(listener.bind_address.clone()));
    }
    if listener.max_handshakes == 0 || listener.max_handshakes > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::MaxHandshakes {
            got: listener.max_handshakes,
            max: Semaphore::MAX_PERMITS,
        });
    }
    if listener.handshake_timeout_ms == 0 {
        errors.push(ValidationError::HandshakeTimeout);
    } else if listener.handshake_timeout_ms > MAX_HANDSHAKE_TIMEOUT_MS {
        // Without a bounded deadline a silent peer keeps its permit forever.
        errors.push(ValidationError::MaxHandshakeTimeout {
            got: listener.handshake_timeout_ms,
            max: MAX_HANDSHAKE_TIMEOUT_MS,
        });
    }

    let handshake = &config.handshake;
    if handshake.min_version > handshake.max_version {
        errors.push(ValidationError::VersionBounds {
            min: handshake.min_version,
            max: handshake.max_version,
        });
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
