//! Handshake engine contract.
//!
//! # Data Flow
//! ```text
//! Identity (listener statics)
//!     → conn_data.rs (per-connection ConnData)
//!     → EngineConfig { role, pattern, version bounds, conn_data }
//!     → EngineFactory::new_engine
//!     → HandshakeEngine::handshake(&mut raw conn)
//!     → HandshakeEngine::finish(raw conn) → secure stream
//! ```
//!
//! # Design Decisions
//! - The cryptography lives behind these traits; the listener never sees
//!   message bytes or session keys
//! - `finish` consumes both the engine and the stream, so a secure stream can
//!   only exist after a successful exchange

pub mod conn_data;
pub mod error;

use std::future::Future;

pub use conn_data::{ConnData, Identity, StaticKey};
pub use error::HandshakeError;

/// Lowest handshake version offered by default.
pub const MIN_HANDSHAKE_VERSION: u8 = 0;

/// Highest handshake version offered by default.
pub const MAX_HANDSHAKE_VERSION: u8 = 2;

/// Which side of the exchange we play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Message pattern of the key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePattern {
    /// Both static keys are transmitted; the passphrase authenticates.
    Xx,
    /// Both static keys are known in advance.
    Kk,
}

/// Everything an engine needs to run one handshake.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub role: Role,
    pub pattern: HandshakePattern,
    pub min_version: u8,
    pub max_version: u8,
    pub conn_data: ConnData,
}

impl EngineConfig {
    /// Config for the passive side of an inbound connection.
    pub fn responder(conn_data: ConnData, min_version: u8, max_version: u8) -> Self {
        Self {
            role: Role::Responder,
            pattern: conn_data.handshake_pattern(),
            min_version,
            max_version,
            conn_data,
        }
    }

    pub fn is_initiator(&self) -> bool {
        self.role == Role::Initiator
    }
}

/// One handshake over a stream of type `S`.
pub trait HandshakeEngine<S>: Send + Sized + 'static {
    /// Secure stream produced once the exchange succeeds.
    type Output: Send + 'static;

    /// Run the full message exchange over `stream`.
    fn handshake(
        &mut self,
        stream: &mut S,
    ) -> impl Future<Output = Result<(), HandshakeError>> + Send;

    /// Wrap the stream with the negotiated session state.
    fn finish(self, stream: S) -> Self::Output;
}

/// Builds a fresh engine per connection.
pub trait EngineFactory<S>: Send + Sync + 'static {
    type Engine: HandshakeEngine<S>;

    fn new_engine(&self, config: EngineConfig) -> Result<Self::Engine, HandshakeError>;
}
