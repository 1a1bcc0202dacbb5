//! Handshake error definitions.

use std::io;
use thiserror::Error;

/// Errors a handshake engine can report.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer did not deliver the next message before the read deadline.
    #[error("handshake timed out")]
    Timeout,

    /// Transport failure while exchanging handshake messages.
    #[error("handshake I/O error: {0}")]
    Io(#[source] io::Error),

    /// A handshake message could not be parsed.
    #[error("malformed handshake message: {0}")]
    Malformed(String),

    /// The peer failed authentication (wrong passphrase, bad MAC, ...).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The peer presented a static key we do not recognise.
    #[error("unknown remote identity")]
    UnknownIdentity,

    /// The peer offered a version outside our supported range.
    #[error("unsupported handshake version {offered} (supported {min}..={max})")]
    UnsupportedVersion { min: u8, max: u8, offered: u8 },

    /// The engine could not be configured or failed internally.
    #[error("handshake engine error: {0}")]
    Engine(String),
}

impl HandshakeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HandshakeError::Timeout)
    }
}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => HandshakeError::Timeout,
            _ => HandshakeError::Io(err),
        }
    }
}
