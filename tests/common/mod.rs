//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use secure_listener::config::Config;
use secure_listener::handshake::{
    EngineConfig, EngineFactory, HandshakeEngine, HandshakeError, Identity, StaticKey,
};
use secure_listener::net::{DeadlineStream, RawConn, SecureListener, StreamListener};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub const PASSPHRASE: &[u8] = b"open sesame";

/// Fixed test key; never used for real key agreement.
pub struct TestKey;

impl StaticKey for TestKey {
    fn public_key(&self) -> Vec<u8> {
        vec![2; 33]
    }

    fn ecdh(&self, _remote_public: &[u8]) -> Result<[u8; 32], HandshakeError> {
        Ok([7; 32])
    }
}

pub fn identity() -> Identity {
    Identity::new(Arc::new(TestKey), PASSPHRASE, b"auth-data".to_vec())
}

pub fn test_config(max_handshakes: usize, handshake_timeout_ms: u64) -> Config {
    let mut config = Config::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.max_handshakes = max_handshakes;
    config.listener.handshake_timeout_ms = handshake_timeout_ms;
    config.observability.metrics_enabled = false;
    config
}

// ---------------------------------------------------------------------------
// Test handshake engine
//
// Initiator sends: [version][len][passphrase; len]
// Responder replies: [0x01] on success.
// ---------------------------------------------------------------------------

const ACK: u8 = 0x01;

pub struct PassphraseEngine {
    config: EngineConfig,
}

impl<S> HandshakeEngine<S> for PassphraseEngine
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Output = S;

    async fn handshake(&mut self, stream: &mut S) -> Result<(), HandshakeError> {
        let version = stream.read_u8().await?;
        if version < self.config.min_version || version > self.config.max_version {
            return Err(HandshakeError::UnsupportedVersion {
                min: self.config.min_version,
                max: self.config.max_version,
                offered: version,
            });
        }

        let len = stream.read_u8().await? as usize;
        if len == 0 {
            return Err(HandshakeError::Malformed("empty passphrase".into()));
        }
        let mut passphrase = vec![0u8; len];
        stream.read_exact(&mut passphrase).await?;
        if passphrase != self.config.conn_data.passphrase() {
            return Err(HandshakeError::Authentication("passphrase mismatch".into()));
        }

        stream.write_u8(ACK).await?;
        stream.flush().await?;
        Ok(())
    }

    fn finish(self, stream: S) -> S {
        stream
    }
}

/// Builds [`PassphraseEngine`]s and remembers every config it was given.
#[derive(Clone, Default)]
pub struct PassphraseFactory {
    pub seen: Arc<Mutex<Vec<EngineConfig>>>,
    pub refuse: bool,
}

impl PassphraseFactory {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn seen(&self) -> Vec<EngineConfig> {
        self.seen.lock().unwrap().clone()
    }
}

impl<S> EngineFactory<S> for PassphraseFactory
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Engine = PassphraseEngine;

    fn new_engine(&self, config: EngineConfig) -> Result<PassphraseEngine, HandshakeError> {
        self.seen.lock().unwrap().push(config.clone());
        if self.refuse {
            return Err(HandshakeError::Engine("engine unavailable".into()));
        }
        Ok(PassphraseEngine { config })
    }
}

/// Run the initiator side. Returns `Ok(())` once the responder acknowledged.
pub async fn client_handshake<S>(stream: &mut S, passphrase: &[u8]) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_u8(2).await?;
    stream.write_u8(passphrase.len() as u8).await?;
    stream.write_all(passphrase).await?;
    stream.flush().await?;

    match stream.read_u8().await? {
        ACK => Ok(()),
        other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unexpected ack {other}"))),
    }
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

enum Incoming {
    Conn(MemoryConn, SocketAddr),
    Error(io::Error),
}

/// Raw connection over an in-memory duplex pipe.
#[derive(Debug)]
pub struct MemoryConn {
    inner: DeadlineStream<DuplexStream>,
    fail_deadline: bool,
}

impl RawConn for MemoryConn {
    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        if self.fail_deadline {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "deadlines not supported"));
        }
        self.inner.set_read_deadline(deadline)
    }
}

impl AsyncRead for MemoryConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConn {
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

/// Listener side of the in-memory transport. Counts raw accepts.
pub struct MemoryTransport {
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
    accepted: Arc<AtomicUsize>,
    local_addr: SocketAddr,
    closed: watch::Sender<bool>,
}

/// Client side of the in-memory transport.
#[derive(Clone)]
pub struct Dialer {
    tx: mpsc::UnboundedSender<Incoming>,
    accepted: Arc<AtomicUsize>,
    next_port: Arc<AtomicU16>,
}

pub fn memory_transport() -> (MemoryTransport, Dialer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));
    let (closed, _) = watch::channel(false);
    let transport = MemoryTransport {
        incoming: tokio::sync::Mutex::new(rx),
        accepted: accepted.clone(),
        local_addr: "192.0.2.1:9735".parse().unwrap(),
        closed,
    };
    let dialer = Dialer {
        tx,
        accepted,
        next_port: Arc::new(AtomicU16::new(40000)),
    };
    (transport, dialer)
}

impl Dialer {
    /// Open a connection; returns the client end and the address the
    /// listener will see for it.
    pub fn connect(&self) -> (DuplexStream, SocketAddr) {
        self.open(false)
    }

    /// Open a connection whose read deadline cannot be set.
    pub fn connect_without_deadlines(&self) -> (DuplexStream, SocketAddr) {
        self.open(true)
    }

    fn open(&self, fail_deadline: bool) -> (DuplexStream, SocketAddr) {
        let (client, server) = tokio::io::duplex(1024);
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let remote_addr = SocketAddr::from(([198, 51, 100, 7], port));
        let conn = MemoryConn {
            inner: DeadlineStream::new(server),
            fail_deadline,
        };
        let _ = self.tx.send(Incoming::Conn(conn, remote_addr));
        (client, remote_addr)
    }

    /// Make the next raw accept fail.
    pub fn inject_accept_error(&self) {
        let _ = self.tx.send(Incoming::Error(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "injected accept failure",
        )));
    }

    /// Raw connections (and injected errors) accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl StreamListener for MemoryTransport {
    type Conn = MemoryConn;

    async fn accept(&self) -> io::Result<(MemoryConn, SocketAddr)> {
        let mut closed = self.closed.subscribe();
        let mut incoming = self.incoming.lock().await;

        let next = tokio::select! {
            next = incoming.recv() => next,
            _ = closed.wait_for(|closed| *closed) => None,
        };

        match next {
            Some(Incoming::Conn(conn, remote_addr)) => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                Ok((conn, remote_addr))
            }
            Some(Incoming::Error(err)) => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                Err(err)
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "memory transport closed")),
        }
    }

    fn close(&self) -> io::Result<()> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

pub type MemoryListener = SecureListener<MemoryTransport, PassphraseFactory>;

pub fn memory_listener(config: &Config) -> (MemoryListener, Dialer, PassphraseFactory) {
    let factory = PassphraseFactory::default();
    let (transport, dialer) = memory_transport();
    let listener = SecureListener::new(transport, config, identity(), factory.clone())
        .expect("test config must validate");
    (listener, dialer, factory)
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F: Fn() -> bool>(within: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
