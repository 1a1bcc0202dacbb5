//! Key material fed into the handshake engine.

use std::fmt;
use std::sync::Arc;

use crate::handshake::{HandshakeError, HandshakePattern};

/// The local long-term identity key.
///
/// The listener only passes it through; engines use it for the key agreement.
pub trait StaticKey: Send + Sync + 'static {
    /// Serialized public half of the key.
    fn public_key(&self) -> Vec<u8>;

    /// Diffie-Hellman between this key and a remote public key.
    fn ecdh(&self, remote_public: &[u8]) -> Result<[u8; 32], HandshakeError>;
}

/// Listener-wide identity: immutable after construction, shared by every
/// handshake.
#[derive(Clone)]
pub struct Identity {
    local_static: Arc<dyn StaticKey>,
    passphrase: Arc<[u8]>,
    auth_data: Arc<[u8]>,
}

impl Identity {
    pub fn new(
        local_static: Arc<dyn StaticKey>,
        passphrase: impl Into<Vec<u8>>,
        auth_data: impl Into<Vec<u8>>,
    ) -> Self {
        let passphrase: Vec<u8> = passphrase.into();
        let auth_data: Vec<u8> = auth_data.into();
        Self {
            local_static,
            passphrase: passphrase.into(),
            auth_data: auth_data.into(),
        }
    }

    /// Connection data for an inbound connection.
    pub fn responder_data(&self) -> ConnData {
        ConnData {
            local_static: self.local_static.clone(),
            remote_static: None,
            passphrase: self.passphrase.clone(),
            auth_data: self.auth_data.clone(),
        }
    }

    /// Connection data for an outbound connection to a possibly known peer.
    pub fn initiator_data(&self, remote_static: Option<Vec<u8>>) -> ConnData {
        ConnData {
            remote_static,
            ..self.responder_data()
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("passphrase", &"<redacted>")
            .field("auth_data_len", &self.auth_data.len())
            .finish_non_exhaustive()
    }
}

/// Per-connection handshake material.
#[derive(Clone)]
pub struct ConnData {
    local_static: Arc<dyn StaticKey>,
    remote_static: Option<Vec<u8>>,
    passphrase: Arc<[u8]>,
    auth_data: Arc<[u8]>,
}

impl ConnData {
    pub fn local_static(&self) -> &dyn StaticKey {
        self.local_static.as_ref()
    }

    /// The remote's static public key, if known up front.
    pub fn remote_static(&self) -> Option<&[u8]> {
        self.remote_static.as_deref()
    }

    pub fn passphrase(&self) -> &[u8] {
        &self.passphrase
    }

    pub fn auth_data(&self) -> &[u8] {
        &self.auth_data
    }

    /// Pattern implied by what we know about the remote.
    ///
    /// A known remote key allows the shorter `KK` exchange; otherwise the
    /// passphrase-authenticated `XX` exchange is used.
    pub fn handshake_pattern(&self) -> HandshakePattern {
        if self.remote_static.is_some() {
            HandshakePattern::Kk
        } else {
            HandshakePattern::Xx
        }
    }
}

impl fmt::Debug for ConnData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnData")
            .field("remote_static", &self.remote_static.is_some())
            .field("passphrase", &"<redacted>")
            .field("auth_data_len", &self.auth_data.len())
            .finish_non_exhaustive()
    }
}
