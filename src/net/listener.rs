//! Listener that authenticates every inbound connection before handing it out.
//!
//! # Responsibilities
//! - Run one accept loop per listener, gated by the admission permits
//! - Spawn one handshake task per raw connection, never waiting on it
//! - Bound each handshake with a read deadline
//! - Deliver successes and per-connection failures to `accept` callers
//! - Shut everything down cooperatively on `close`
//!
//! # Design Decisions
//! - A slow peer only ever holds its own permit; the accept loop moves on
//! - Outcomes arrive in the order handshakes finish, not the order
//!   connections were accepted
//! - Per-connection errors are values for `accept`, never panics or loop exits

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::{validate_config, Config, ValidationError};
use crate::handshake::{EngineConfig, EngineFactory, HandshakeEngine, HandshakeError, Identity};
use crate::lifecycle::Shutdown;
use crate::net::connection::{
    ConnectionId, HandshakeGuard, HandshakeState, HandshakeTracker, SecureConn,
};
use crate::net::gate::{AdmissionGate, HandshakePermit};
use crate::net::rendezvous::Rendezvous;
use crate::net::transport::{RawConn, StreamListener, TcpConn, TcpTransport};
use crate::observability::metrics;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configuration failed validation.
    #[error("invalid listener configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),

    /// The raw transport failed to accept a connection.
    #[error("unable to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The handshake read deadline could not be set or cleared.
    #[error("unable to set read deadline for {remote_addr}: {source}")]
    Deadline {
        remote_addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The peer did not complete the handshake.
    #[error("unable to accept connection from {remote_addr}: {source}")]
    Handshake {
        remote_addr: SocketAddr,
        #[source]
        source: HandshakeError,
    },

    /// The listener has been closed.
    #[error("secure listener closed")]
    Closed,

    /// Closing the raw transport failed.
    #[error("failed to close transport: {0}")]
    Close(#[source] io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ListenerError {
    /// Remote peer the error concerns, when there is one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        match self {
            ListenerError::Deadline { remote_addr, .. }
            | ListenerError::Handshake { remote_addr, .. } => Some(*remote_addr),
            _ => None,
        }
    }

    /// Whether this is the terminal "listener closed" error rather than a
    /// failure of one connection attempt.
    pub fn is_closed(&self) -> bool {
        matches!(self, ListenerError::Closed)
    }
}

impl From<ListenerError> for io::Error {
    fn from(err: ListenerError) -> Self {
        let kind = match &err {
            ListenerError::Bind(e) | ListenerError::Accept(e) | ListenerError::Close(e) => e.kind(),
            ListenerError::Deadline { source, .. } => source.kind(),
            ListenerError::Handshake { source, .. } if source.is_timeout() => {
                io::ErrorKind::TimedOut
            }
            ListenerError::Handshake { .. } => io::ErrorKind::ConnectionAborted,
            ListenerError::Closed => io::ErrorKind::NotConnected,
            ListenerError::Config(_) => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}

/// Secure stream type produced by factory `F` over raw connections `C`.
pub type SecureStream<C, F> = <<F as EngineFactory<C>>::Engine as HandshakeEngine<C>>::Output;

/// Result of one accepted connection, as seen by `accept`.
pub type Outcome<C, F> = Result<SecureConn<SecureStream<C, F>>, ListenerError>;

#[derive(Debug, Clone, Copy)]
struct HandshakeSettings {
    timeout: Duration,
    min_version: u8,
    max_version: u8,
    metrics_enabled: bool,
}

struct Shared<T, F>
where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
{
    transport: T,
    factory: F,
    identity: Identity,
    settings: HandshakeSettings,
    gate: AdmissionGate,
    tracker: HandshakeTracker,
    outcomes: Rendezvous<Outcome<T::Conn, F>>,
    shutdown: Shutdown,
}

/// Authenticating listener.
///
/// Every connection returned by [`accept`](SecureListener::accept) has
/// completed the handshake in the responder role. Dropping the listener
/// closes it.
pub struct SecureListener<T, F>
where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
{
    shared: Arc<Shared<T, F>>,
}

impl<F> SecureListener<TcpTransport, F>
where
    F: EngineFactory<TcpConn>,
{
    /// Bind a TCP listener on `config.listener.bind_address`.
    ///
    /// The configuration is validated before anything is bound.
    pub async fn bind(
        config: &Config,
        identity: Identity,
        factory: F,
    ) -> Result<Self, ListenerError> {
        validate_config(config).map_err(ListenerError::Config)?;
        let addr: SocketAddr = config
            .listener
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let transport = TcpTransport::bind(addr).await.map_err(ListenerError::Bind)?;
        Ok(Self::start(transport, config, identity, factory))
    }
}

impl<T, F> SecureListener<T, F>
where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
{
    /// Wrap an already bound transport and start the accept loop.
    ///
    /// Fails with [`ListenerError::Config`] when `config` does not validate,
    /// for example a zero handshake limit. Must be called from within a Tokio
    /// runtime.
    pub fn new(
        transport: T,
        config: &Config,
        identity: Identity,
        factory: F,
    ) -> Result<Self, ListenerError> {
        validate_config(config).map_err(ListenerError::Config)?;
        Ok(Self::start(transport, config, identity, factory))
    }

    fn start(transport: T, config: &Config, identity: Identity, factory: F) -> Self {
        let shutdown = Shutdown::new();
        let settings = HandshakeSettings {
            timeout: config.listener.handshake_timeout(),
            min_version: config.handshake.min_version,
            max_version: config.handshake.max_version,
            metrics_enabled: config.observability.metrics_enabled,
        };

        let shared = Arc::new(Shared {
            gate: AdmissionGate::new(config.listener.max_handshakes),
            tracker: HandshakeTracker::new(),
            outcomes: Rendezvous::new(shutdown.subscribe()),
            transport,
            factory,
            identity,
            settings,
            shutdown,
        });

        tracing::info!(
            address = %shared.transport.local_addr(),
            max_handshakes = shared.gate.capacity(),
            handshake_timeout_ms = settings.timeout.as_millis() as u64,
            "Secure listener bound"
        );

        tokio::spawn(accept_loop(Arc::clone(&shared)));
        Self { shared }
    }

    /// Wait for the next outcome.
    ///
    /// Returns the next authenticated connection, the next per-connection
    /// failure, or [`ListenerError::Closed`] once the listener is closed and
    /// nothing is left to hand out. Safe to call concurrently; each outcome
    /// goes to exactly one caller.
    pub async fn accept(&self) -> Outcome<T::Conn, F> {
        match self.shared.outcomes.take().await {
            Ok(outcome) => outcome,
            Err(_) => Err(ListenerError::Closed),
        }
    }

    /// Close the listener.
    ///
    /// Raises shutdown once, then closes the transport. Blocked `accept`
    /// calls return promptly. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), ListenerError> {
        if self.shared.shutdown.trigger() {
            self.shared.gate.close();
            tracing::info!(
                address = %self.local_addr(),
                in_flight = self.shared.tracker.active_count(),
                permits_held = self.shared.gate.in_flight(),
                "Secure listener closing"
            );
        }
        self.shared.transport.close().map_err(ListenerError::Close)
    }

    /// Address the transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.transport.local_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_triggered()
    }

    /// Handshake tasks that have not finished yet.
    pub fn handshakes_in_flight(&self) -> usize {
        self.shared.tracker.active_count()
    }

    /// Maximum handshakes allowed in flight.
    pub fn max_handshakes(&self) -> usize {
        self.shared.gate.capacity()
    }
}

impl<T, F> Drop for SecureListener<T, F>
where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close listener on drop");
        }
    }
}

impl<T, F> StreamListener for SecureListener<T, F>
where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
    SecureStream<T::Conn, F>: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    type Conn = SecureConn<SecureStream<T::Conn, F>>;

    async fn accept(&self) -> io::Result<(Self::Conn, SocketAddr)> {
        let conn = SecureListener::accept(self).await?;
        let remote_addr = conn.remote_addr();
        Ok((conn, remote_addr))
    }

    fn close(&self) -> io::Result<()> {
        SecureListener::close(self).map_err(io::Error::from)
    }

    fn local_addr(&self) -> SocketAddr {
        SecureListener::local_addr(self)
    }
}

async fn accept_loop<T, F>(shared: Arc<Shared<T, F>>)
where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
{
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        // Acquire permit first (backpressure)
        let permit = tokio::select! {
            permit = shared.gate.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.recv() => break,
        };

        let accepted = tokio::select! {
            accepted = shared.transport.accept() => accepted,
            _ = shutdown.recv() => break,
        };

        match accepted {
            Ok((conn, remote_addr)) => {
                let id = ConnectionId::new();
                let guard = shared.tracker.track();
                tracing::debug!(
                    connection_id = %id,
                    remote_addr = %remote_addr,
                    available_permits = shared.gate.available(),
                    "Connection accepted"
                );
                if shared.settings.metrics_enabled {
                    metrics::record_in_flight(shared.tracker.active_count());
                }

                let span = tracing::debug_span!(
                    "handshake",
                    connection_id = id.as_u64(),
                    remote_addr = %remote_addr
                );
                let slot = (permit, guard);
                let task = handshake_task(Arc::clone(&shared), conn, remote_addr, id, slot);
                tokio::spawn(task.instrument(span));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
                if shared.settings.metrics_enabled {
                    metrics::record_accept_error();
                }
                let _ = shared.outcomes.publish(Err(ListenerError::Accept(e))).await;
                drop(permit);
            }
        }
    }

    tracing::debug!(address = %shared.transport.local_addr(), "Accept loop stopped");
}

async fn handshake_task<T, F>(
    shared: Arc<Shared<T, F>>,
    conn: T::Conn,
    remote_addr: SocketAddr,
    id: ConnectionId,
    slot: (HandshakePermit, HandshakeGuard),
) where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
{
    let state = shared.handshake(conn, remote_addr, id).await;
    debug_assert!(state.is_terminal());
    drop(slot);

    if shared.settings.metrics_enabled {
        metrics::record_handshake(state);
        metrics::record_in_flight(shared.tracker.active_count());
    }
    tracing::trace!(%state, "Handshake task finished");
}

impl<T, F> Shared<T, F>
where
    T: StreamListener,
    T::Conn: RawConn,
    F: EngineFactory<T::Conn>,
{
    /// Drive one inbound connection to a terminal state.
    async fn handshake(
        &self,
        mut conn: T::Conn,
        remote_addr: SocketAddr,
        id: ConnectionId,
    ) -> HandshakeState {
        tracing::trace!(state = %HandshakeState::Spawned);
        if self.shutdown.is_triggered() {
            return HandshakeState::Abandoned;
        }

        tracing::trace!(state = %HandshakeState::ConfiguringEngine);
        let config = EngineConfig::responder(
            self.identity.responder_data(),
            self.settings.min_version,
            self.settings.max_version,
        );
        let mut engine = match self.factory.new_engine(config) {
            Ok(engine) => engine,
            Err(source) => {
                drop(conn);
                return self.reject(ListenerError::Handshake { remote_addr, source }).await;
            }
        };

        // Bounds how long the peer may stall between handshake messages.
        let deadline = Instant::now() + self.settings.timeout;
        if let Err(source) = conn.set_read_deadline(Some(deadline)) {
            drop(conn);
            return self.reject(ListenerError::Deadline { remote_addr, source }).await;
        }

        tracing::trace!(state = %HandshakeState::AwaitingHandshake);
        if let Err(source) = engine.handshake(&mut conn).await {
            drop(conn);
            return self.reject(ListenerError::Handshake { remote_addr, source }).await;
        }

        if let Err(source) = conn.set_read_deadline(None) {
            drop(conn);
            return self.reject(ListenerError::Deadline { remote_addr, source }).await;
        }
        let secure = SecureConn::new(engine.finish(conn), remote_addr, id);

        if self.shutdown.is_triggered() {
            return HandshakeState::Abandoned;
        }

        tracing::debug!("Handshake completed");
        // A cancelled publish has already closed the connection.
        match self.outcomes.publish(Ok(secure)).await {
            Ok(()) => HandshakeState::Succeeded,
            Err(_) => HandshakeState::Abandoned,
        }
    }

    async fn reject(&self, err: ListenerError) -> HandshakeState {
        tracing::warn!(error = %err, "Handshake failed");
        let _ = self.outcomes.publish(Err(err)).await;
        HandshakeState::Failed
    }
}
