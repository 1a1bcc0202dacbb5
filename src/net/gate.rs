//! Admission control for in-flight handshakes.
//!
//! # Responsibilities
//! - Bound how many handshakes run at once
//! - Hand out permits that release themselves on drop
//! - Refuse new permits once the listener is closing
//!
//! # Design Decisions
//! - Backed by a Tokio semaphore; closing it is the "closed" indication
//! - Capacity is fixed at construction and never resized

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of handshakes allowed in flight.
pub const DEFAULT_MAX_HANDSHAKES: usize = 1000;

/// Returned by [`AdmissionGate::acquire`] once the gate is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission gate closed")]
pub struct GateClosed;

/// A fixed pool of handshake permits.
#[derive(Debug)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate with `capacity` permits.
    ///
    /// `capacity` must be non-zero and at most [`Semaphore::MAX_PERMITS`];
    /// configuration validation enforces this.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a permit.
    ///
    /// Returns [`GateClosed`] instead of waiting forever once [`close`] has
    /// been called, including for callers already parked here.
    ///
    /// [`close`]: AdmissionGate::close
    pub async fn acquire(&self) -> Result<HandshakePermit, GateClosed> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        Ok(HandshakePermit { _permit: permit })
    }

    /// Close the gate. Permits already handed out stay valid until dropped.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Permits currently held, including one the accept loop may hold while
    /// it waits for the next raw connection.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A handshake slot.
///
/// Dropping it returns the slot to the gate, so every exit path of a
/// handshake task (including a panic) releases exactly once.
#[derive(Debug)]
pub struct HandshakePermit {
    _permit: OwnedSemaphorePermit,
}
