//! NETCONF session engine.
//!
//! This crate drives one NETCONF session over any byte stream:
//! - A per-session I/O task that frames, parses and dispatches messages
//! - The `<hello>` capability exchange and base version negotiation
//! - Correlation of `<rpc-reply>` documents with outstanding requests
//! - A queue for event notifications
//! - Capability-checked builders for the standard operations
//!
//! # Example
//!
//! ```rust,no_run
//! use netconf_session::{Session, SessionOptions, operations};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = tokio::net::TcpStream::connect("192.0.2.1:830").await?;
//!     let session = Session::connect(stream, "192.0.2.1:830", SessionOptions::default()).await?;
//!
//!     let get = operations::get(session.server_capabilities(), None)?;
//!     let reply = session.request(&get).await?;
//!     println!("{}", reply.data.unwrap_or_default());
//!
//!     session.close_session().await?;
//!     Ok(())
//! }
//! ```

mod correlator;
mod error;
mod handshake;
mod ledger;
mod listener;
mod notify;
pub mod operations;
mod session;
mod transport;

pub use correlator::{AbortHandle, PendingRpc, RpcCorrelator, wait_reply};
pub use error::{NetconfError, NetconfResult};
pub use handshake::{DEFAULT_HELLO_TIMEOUT, HandshakeState};
pub use ledger::{LEDGER_CAPACITY, TimestampLedger};
pub use listener::{DispatchOutcome, ListenerId, ListenerRegistry, SessionListener};
pub use notify::{NotificationListener, NotificationQueue, notification_channel};
pub use operations::{CommitOptions, Datastore, Filter};
pub use session::{CloseReason, DEFAULT_RPC_TIMEOUT, Session, SessionOptions, SessionState};
pub use transport::{BoxedTransport, Transport};
