//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → handed to SecureListener::bind / SecureListener::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the listener is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{Config, HandshakeConfig, ListenerConfig, ObservabilityConfig};
pub use validation::{validate_config, ValidationError, MAX_HANDSHAKE_TIMEOUT_MS};
