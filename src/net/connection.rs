//! Authenticated connections and per-handshake state.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Name the states a handshake task moves through
//! - Count handshake tasks that are still running
//! - Carry the secure stream handed to `accept` callers

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handshake task state.
///
/// ```text
/// Spawned → ConfiguringEngine → AwaitingHandshake → Succeeded
///                                                 → Failed
///                                                 → Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Spawned,
    ConfiguringEngine,
    AwaitingHandshake,
    /// The secure connection was handed to an `accept` caller.
    Succeeded,
    /// A failure outcome was reported for this connection.
    Failed,
    /// Shutdown intervened; the connection was closed without an outcome.
    Abandoned,
}

impl HandshakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeState::Spawned => "spawned",
            HandshakeState::ConfiguringEngine => "configuring_engine",
            HandshakeState::AwaitingHandshake => "awaiting_handshake",
            HandshakeState::Succeeded => "succeeded",
            HandshakeState::Failed => "failed",
            HandshakeState::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Succeeded | HandshakeState::Failed | HandshakeState::Abandoned
        )
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks running handshake tasks.
///
/// Unlike the admission gate's permit count, this excludes the permit the
/// accept loop holds while it waits for the next raw connection.
#[derive(Debug, Clone, Default)]
pub struct HandshakeTracker {
    active_count: Arc<AtomicUsize>,
}

impl HandshakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new handshake task. Returns a guard that decrements on drop.
    pub fn track(&self) -> HandshakeGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        HandshakeGuard {
            active_count: Arc::clone(&self.active_count),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard for one handshake task. Decrements the count when dropped.
#[derive(Debug)]
pub struct HandshakeGuard {
    active_count: Arc<AtomicUsize>,
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection that completed the handshake.
///
/// Reads and writes go through the engine's secure stream `C`.
#[derive(Debug)]
pub struct SecureConn<C> {
    inner: C,
    remote_addr: SocketAddr,
    id: ConnectionId,
}

impl<C> SecureConn<C> {
    pub fn new(inner: C, remote_addr: SocketAddr, id: ConnectionId) -> Self {
        Self {
            inner,
            remote_addr,
            id,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for SecureConn<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<C: AsyncWrite + Unpin> AsyncWrite for SecureConn<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
