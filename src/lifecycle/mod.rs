//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! SecureListener::close()
//!     → shutdown.rs (flag raised once)
//!     → accept loop stops waiting on permits and the transport
//!     → handshake tasks abandon at their next checkpoint
//!     → blocked accept() callers drain the hand-off slot, then see Closed
//! ```
//!
//! # Design Decisions
//! - The flag is a watch channel, so late subscribers still observe it
//! - Shutdown is cooperative: nothing is aborted mid-handshake

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal};
