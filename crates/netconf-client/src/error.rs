//! Client error types.

use netconf_session::NetconfError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session or protocol failure.
    #[error(transparent)]
    Netconf(#[from] NetconfError),

    /// Call-home listener failure.
    #[error("call home: {0}")]
    CallHome(String),

    /// Stopped before a session was established.
    #[error("stopped before a session was established")]
    Stopped,
}

impl ClientError {
    /// Convenience constructor for configuration errors.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netconf_errors_display_transparently() {
        let err = ClientError::from(NetconfError::session("capability exchange timed out"));
        assert_eq!(err.to_string(), "session error: capability exchange timed out");
    }

    #[test]
    fn io_errors_convert() {
        let err: ClientError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert!(matches!(err, ClientError::Io(_)));
        assert_eq!(err.to_string(), "IO error: no such file");
    }
}
