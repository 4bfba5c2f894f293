//! Byte stream abstraction the session runs over.

use tokio::io::{AsyncRead, AsyncWrite};

/// A reliable, ordered byte stream to a NETCONF peer.
///
/// SSH channels, child process pipes, TCP streams and in-memory duplex
/// pipes all qualify.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased transport, for connectors that pick the stream at runtime.
pub type BoxedTransport = Box<dyn Transport>;
