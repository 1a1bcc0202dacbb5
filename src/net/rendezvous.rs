//! Single-slot hand-off between handshake tasks and `accept` callers.
//!
//! # Responsibilities
//! - Move one outcome at a time from a producer to exactly one consumer
//! - Block producers until their outcome has actually been taken
//! - Unblock both sides when the listener shuts down
//!
//! # Design Decisions
//! - A capacity-one channel carries the outcome plus a oneshot "taken" ack,
//!   so memory stays O(1) however many handshakes finish unobserved
//! - After shutdown, `take` still returns an outcome already in the slot;
//!   a publisher that loses that race withdraws its value and drops it, so
//!   `publish` reports exactly whether the value was delivered

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::lifecycle::ShutdownSignal;

/// The hand-off was cut short by shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rendezvous cancelled by shutdown")]
pub struct Cancelled;

struct Handoff<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

impl<T> Handoff<T> {
    fn complete(self) -> T {
        let _ = self.taken.send(());
        self.value
    }
}

/// Cancellable rendezvous channel.
pub struct Rendezvous<T> {
    tx: mpsc::Sender<Handoff<T>>,
    rx: Mutex<mpsc::Receiver<Handoff<T>>>,
    shutdown: ShutdownSignal,
}

impl<T: Send> Rendezvous<T> {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
            shutdown,
        }
    }

    /// Hand `value` to the next taker.
    ///
    /// Waits until a taker has received it or shutdown is signaled. Returns
    /// `Ok(())` only if a taker got the value. On `Err(Cancelled)` the value
    /// has been dropped.
    pub async fn publish(&self, value: T) -> Result<(), Cancelled> {
        let mut shutdown = self.shutdown.clone();
        if shutdown.is_triggered() {
            return Err(Cancelled);
        }

        let (taken_tx, taken_rx) = oneshot::channel();
        let handoff = Handoff {
            value,
            taken: taken_tx,
        };

        tokio::select! {
            sent = self.tx.send(handoff) => sent.map_err(|_| Cancelled)?,
            _ = shutdown.recv() => return Err(Cancelled),
        }

        let mut taken_rx = taken_rx;
        tokio::select! {
            biased;
            taken = &mut taken_rx => return taken.map_err(|_| Cancelled),
            _ = shutdown.recv() => {}
        }

        // Takers complete the ack while holding the receiver lock, so once we
        // hold it either our value was taken or it is still first in the slot.
        let mut rx = self.rx.lock().await;
        if taken_rx.try_recv().is_ok() {
            return Ok(());
        }
        drop(rx.try_recv());
        Err(Cancelled)
    }

    /// Wait for the next published value.
    ///
    /// After shutdown, returns a value still sitting in the slot if there is
    /// one, otherwise `Err(Cancelled)`. Concurrent takers each get distinct
    /// values.
    pub async fn take(&self) -> Result<T, Cancelled> {
        let mut shutdown = self.shutdown.clone();

        let mut rx = tokio::select! {
            rx = self.rx.lock() => rx,
            _ = shutdown.recv() => return self.try_take(),
        };

        let handoff = tokio::select! {
            biased;
            handoff = rx.recv() => handoff,
            _ = shutdown.recv() => rx.try_recv().ok(),
        };
        handoff.map(Handoff::complete).ok_or(Cancelled)
    }

    /// Take a value only if one is already waiting in the slot.
    pub fn try_take(&self) -> Result<T, Cancelled> {
        let mut rx = self.rx.try_lock().map_err(|_| Cancelled)?;
        rx.try_recv().map(Handoff::complete).map_err(|_| Cancelled)
    }
}

impl<T> std::fmt::Debug for Rendezvous<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("closing", &self.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}
