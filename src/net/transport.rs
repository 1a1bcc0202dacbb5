//! Raw transport abstraction and the default TCP implementation.
//!
//! # Responsibilities
//! - Define the listener capability shared by raw and secure listeners
//! - Define the raw connection contract (byte stream plus read deadline)
//! - Bind, accept and close plain TCP sockets
//!
//! # Design Decisions
//! - Read deadlines are a timer polled inside `poll_read`, so an expired
//!   deadline surfaces as `io::ErrorKind::TimedOut` from the next read
//! - The local address is captured at bind time and stays stable after close
//! - `close` is idempotent and wakes any accept parked on the socket

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{Instant, Sleep};

/// A listener that yields bidirectional byte streams.
///
/// Implemented by [`TcpTransport`] and by
/// [`SecureListener`](crate::net::listener::SecureListener), so generic server
/// code can run on either.
pub trait StreamListener: Send + Sync + 'static {
    /// Connection type produced by `accept`.
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection and its remote address.
    fn accept(&self) -> impl Future<Output = io::Result<(Self::Conn, SocketAddr)>> + Send;

    /// Stop accepting. Calling it again is a no-op.
    fn close(&self) -> io::Result<()>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> SocketAddr;
}

/// A raw connection the handshake can run over.
pub trait RawConn: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Set (`Some`) or clear (`None`) the read deadline.
    ///
    /// Reads pending or issued after the deadline fail with
    /// `io::ErrorKind::TimedOut`.
    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;
}

/// Plain TCP listener.
#[derive(Debug)]
pub struct TcpTransport {
    inner: Mutex<Option<Arc<TcpListener>>>,
    local_addr: SocketAddr,
    closed: watch::Sender<bool>,
}

impl TcpTransport {
    /// Bind to `addr`.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener)
    }

    /// Wrap an already bound Tokio listener.
    pub fn from_listener(listener: TcpListener) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (closed, _) = watch::channel(false);
        Ok(Self {
            inner: Mutex::new(Some(Arc::new(listener))),
            local_addr,
            closed,
        })
    }

    fn listener(&self) -> Option<Arc<TcpListener>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "tcp listener closed")
}

impl StreamListener for TcpTransport {
    type Conn = TcpConn;

    async fn accept(&self) -> io::Result<(TcpConn, SocketAddr)> {
        let listener = self.listener().ok_or_else(closed_error)?;
        let mut closed = self.closed.subscribe();

        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = accepted?;
                Ok((DeadlineStream::new(stream), remote_addr))
            }
            _ = closed.wait_for(|closed| *closed) => Err(closed_error()),
        }
    }

    fn close(&self) -> io::Result<()> {
        let listener = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if listener.is_some() {
            self.closed.send_replace(true);
            tracing::debug!(address = %self.local_addr, "TCP listener closed");
        }
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// TCP connection with read-deadline support.
pub type TcpConn = DeadlineStream<TcpStream>;

/// Wraps any byte stream with a read deadline.
#[derive(Debug)]
pub struct DeadlineStream<S> {
    stream: S,
    read_deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> DeadlineStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_deadline: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> RawConn for DeadlineStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.read_deadline = deadline.map(|at| Box::pin(tokio::time::sleep_until(at)));
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(deadline) = this.read_deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read deadline exceeded",
                )));
            }
        }
        Pin::new(&mut this.stream).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn local_transport() -> TcpTransport {
        TcpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn accepts_and_reports_remote_addr() {
        let transport = local_transport().await;
        let addr = transport.local_addr();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_conn, remote) = transport.accept().await.unwrap();
        let client = client.await.unwrap();
        assert_eq!(remote, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn read_deadline_times_out_and_can_be_cleared() {
        let transport = local_transport().await;
        let addr = transport.local_addr();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (mut conn, _) = transport.accept().await.unwrap();
        let mut client = client.await.unwrap();

        conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(50)))
            .unwrap();
        let mut buf = [0u8; 4];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        conn.set_read_deadline(None).unwrap();
        client.write_all(b"ping").await.unwrap();
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn close_unblocks_accept_and_is_idempotent() {
        let transport = Arc::new(local_transport().await);
        let addr = transport.local_addr();

        let pending = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.accept().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        transport.close().unwrap();
        transport.close().unwrap();

        let err = tokio::time::timeout(Duration::from_millis(500), pending)
            .await
            .expect("accept should unblock")
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(transport.local_addr(), addr);
        assert!(transport.accept().await.is_err());
    }
}
