//! Session error types.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use netconf_core::MissingCapability;
use netconf_protocol::{ProtocolError, RpcError};
use thiserror::Error;

/// Result type for session operations.
pub type NetconfResult<T> = Result<T, NetconfError>;

/// Errors surfaced by a NETCONF session.
///
/// `Clone` so a single failure can be delivered to every listener and every
/// pending RPC.
#[derive(Debug, Clone, Error)]
pub enum NetconfError {
    /// The byte stream failed.
    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),

    /// Handshake or protocol level failure.
    #[error("session error: {0}")]
    Session(String),

    /// The peer ended the stream while the session was not closing.
    #[error("session terminated unexpectedly ({} bytes undelivered)", buffered.len())]
    SessionClosed { buffered: String },

    /// The server does not advertise a required capability.
    #[error(transparent)]
    MissingCapability(#[from] MissingCapability),

    /// An `<rpc-reply>` carried an `<rpc-error>`.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// No reply arrived before the deadline.
    #[error("no reply to message-id {message_id} within {timeout:?}")]
    Timeout {
        message_id: String,
        timeout: Duration,
    },

    /// The wait was aborted by the caller.
    #[error("canceled by user")]
    Canceled,

    /// Malformed frame or XML.
    #[error("parse error: {0}")]
    Parse(#[from] ProtocolError),

    /// Operation attempted before the handshake or after close.
    #[error("not connected")]
    NotConnected,

    /// Operation arguments that can never produce a valid request.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<io::Error> for NetconfError {
    fn from(err: io::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

impl NetconfError {
    /// Creates a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// Creates a transport error from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(Arc::new(io::Error::other(message.into())))
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// True for errors that end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Session(_) | Self::SessionClosed { .. } | Self::Parse(_)
        )
    }
}
