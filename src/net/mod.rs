//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Raw connection
//!     → transport.rs (raw accept, read deadlines)
//!     → gate.rs (one permit per in-flight handshake)
//!     → listener.rs (accept loop, handshake task per connection)
//!     → rendezvous.rs (one outcome at a time)
//!     → SecureListener::accept → SecureConn (connection.rs)
//!
//! Handshake task states:
//!     Spawned → ConfiguringEngine → AwaitingHandshake → Succeeded | Failed | Abandoned
//! ```
//!
//! # Design Decisions
//! - Bounded handshake concurrency prevents resource exhaustion
//! - The hand-off to `accept` holds at most one outcome
//! - Raw and secure listeners share the `StreamListener` capability

pub mod connection;
pub mod gate;
pub mod listener;
pub mod rendezvous;
pub mod transport;

pub use connection::{ConnectionId, HandshakeState, SecureConn};
pub use listener::{ListenerError, SecureListener};
pub use transport::{DeadlineStream, RawConn, StreamListener, TcpConn, TcpTransport};
