//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::handshake::{MAX_HANDSHAKE_VERSION, MIN_HANDSHAKE_VERSION};
use crate::net::gate::DEFAULT_MAX_HANDSHAKES;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Listener configuration (bind address, admission limits).
    pub listener: ListenerConfig,

    /// Handshake negotiation bounds.
    pub handshake: HandshakeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Maximum handshakes in flight at once.
    pub max_handshakes: usize,

    /// Read deadline for the handshake, in milliseconds.
    pub handshake_timeout_ms: u64,
}

impl ListenerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            max_handshakes: DEFAULT_MAX_HANDSHAKES,
            handshake_timeout_ms: 1000,
        }
    }
}

/// Version bounds offered to the handshake engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandshakeConfig {
    pub min_version: u8,
    pub max_version: u8,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            min_version: MIN_HANDSHAKE_VERSION,
            max_version: MAX_HANDSHAKE_VERSION,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit handshake metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
