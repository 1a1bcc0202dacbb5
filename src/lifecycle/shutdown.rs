//! Shutdown coordination for the listener.

use tokio::sync::watch;

/// Coordinator for listener shutdown.
///
/// Holds a single-use flag. Once triggered it stays triggered, and every
/// [`ShutdownSignal`] handed out before or after observes it.
#[derive(Debug)]
pub struct Shutdown {
    /// Watch channel sender carrying the flag.
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new, untriggered shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    ///
    /// Returns `true` only for the call that actually raised the flag.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`], cheap to clone into tasks.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until shutdown is triggered.
    ///
    /// Resolves immediately if it already was. A dropped coordinator counts
    /// as shutdown.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    /// Non-blocking check of the flag.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
