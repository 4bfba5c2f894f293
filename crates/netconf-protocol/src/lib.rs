//! NETCONF over SSH framing and message types.
//!
//! # Framing
//!
//! RFC 6242 defines two wire formats, selected by the negotiated base
//! protocol version:
//!
//! - base:1.0 terminates every message with `]]>]]>`
//! - base:1.1 splits messages into chunks `\n#<len>\n<payload>` and ends
//!   them with `\n##\n`
//!
//! [`FrameDecoder`] turns an arbitrarily split byte stream into complete
//! documents, [`encode_frame`] does the reverse.
//!
//! # Messages
//!
//! [`parse_document`] builds a small element tree shared by every consumer
//! of an incoming document. [`Hello`], [`RpcReply`] and [`Notification`]
//! are views over that tree.
//!
//! # Example
//!
//! ```rust
//! use netconf_protocol::{BaseVersion, FrameDecoder, encode_frame};
//!
//! let bytes = encode_frame("<hello/>", BaseVersion::V1_1).unwrap();
//! let mut decoder = FrameDecoder::new(BaseVersion::V1_1);
//! decoder.feed(&bytes);
//! assert_eq!(decoder.next_message().unwrap().as_deref(), Some("<hello/>"));
//! ```

mod error;
mod framing;
mod message;
mod xml;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{FrameDecoder, encode_frame};
pub use message::{
    Hello, NamespaceDecl, Notification, Operation, RpcError, RpcReply, build_hello, build_rpc,
    extract_operation, is_notification, message_id_of,
};
pub use netconf_core::BaseVersion;
pub use xml::{Element, QualifiedName, compact_xml, parse_document, pretty_xml};

/// NETCONF base namespace.
pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// NETCONF event notification namespace (RFC 5277).
pub const NETCONF_NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// YANG module monitoring namespace, used by `<get-schema>`.
pub const NETCONF_MONITORING_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";

/// base:1.0 end-of-message delimiter.
pub const MSG_DELIM: &[u8] = b"]]>]]>";

/// base:1.1 end-of-chunks marker.
pub const END_OF_CHUNKS: &[u8] = b"\n##\n";

/// Largest chunk size allowed by RFC 6242.
pub const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

/// Default upper bound on a single reassembled message (256 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;
