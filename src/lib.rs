//! Authenticated stream listener.
//!
//! Wraps a raw stream transport and runs an authenticated key-exchange
//! handshake on every inbound connection before `accept` hands it out.
//!
//! ```text
//!   raw transport ──▶ accept loop ──▶ handshake tasks (≤ max_handshakes)
//!                       ▲                    │
//!                 admission gate             ▼
//!                                     rendezvous slot ──▶ SecureListener::accept
//! ```

pub mod config;
pub mod handshake;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::Config;
pub use handshake::{
    EngineConfig, EngineFactory, HandshakeEngine, HandshakeError, Identity, StaticKey,
};
pub use lifecycle::Shutdown;
pub use net::{ListenerError, SecureConn, SecureListener, StreamListener};
