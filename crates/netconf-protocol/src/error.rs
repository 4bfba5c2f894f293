//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing or parsing NETCONF messages.
///
/// Framing errors leave the decoder in an unknown position and end the
/// session; XML errors only affect the message they occur in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A base:1.1 chunk header did not match `\n#<size>\n` or `\n##\n`.
    #[error("invalid chunk header: {0}")]
    InvalidChunkHeader(String),

    /// Chunk size outside 1..=4294967295.
    #[error("chunk size {size} out of range (max: {max})")]
    ChunkTooLarge { size: u64, max: u64 },

    /// Reassembled message exceeds the decoder limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Message bytes are not UTF-8.
    #[error("message is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Low level XML syntax error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Well-formed XML that is not a valid NETCONF message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Required element missing.
    #[error("missing element <{0}>")]
    MissingElement(String),

    /// Nothing to frame or parse.
    #[error("empty message")]
    EmptyMessage,
}

impl From<quick_xml::Error> for ProtocolError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ProtocolError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ProtocolError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::InvalidUtf8(err.to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::Xml(err.to_string())
    }
}
