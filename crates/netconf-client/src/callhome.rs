//! NETCONF call home: the device opens the connection.
//!
//! The listener binds the call-home port on every address family it can,
//! reports what happens on an event channel, and hands out the first
//! connection that arrives.

use std::fmt;
use std::future::poll_fn;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::task::{Context, Poll};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

/// Something the call-home listener did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallHomeEvent {
    Listening { addr: SocketAddr },
    BindFailed { addr: SocketAddr, error: String },
    /// A device opened a connection.
    Attempt { peer: SocketAddr },
    AcceptFailed { error: String },
}

impl fmt::Display for CallHomeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening { addr } => write!(f, "Listening for call home on {addr}"),
            Self::BindFailed { addr, error } => write!(f, "Could not listen on {addr}: {error}"),
            Self::Attempt { peer } => write!(f, "Call home connection from {peer}"),
            Self::AcceptFailed { error } => write!(f, "Call home connection failed: {error}"),
        }
    }
}

/// Listening sockets for one call-home port.
#[derive(Debug)]
pub struct CallHomeListener {
    listeners: Vec<TcpListener>,
    events: mpsc::UnboundedSender<CallHomeEvent>,
}

impl CallHomeListener {
    /// Binds `port` on the IPv6 and IPv4 wildcard addresses.
    ///
    /// Fails only when no address could be bound.
    pub async fn bind(
        port: u16,
    ) -> ClientResult<(Self, mpsc::UnboundedReceiver<CallHomeEvent>)> {
        Self::bind_addrs(&[
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        ])
        .await
    }

    /// Binds every address in `addrs`.
    pub async fn bind_addrs(
        addrs: &[SocketAddr],
    ) -> ClientResult<(Self, mpsc::UnboundedReceiver<CallHomeEvent>)> {
        let (events, receiver) = mpsc::unbounded_channel();
        let mut listeners: Vec<TcpListener> = Vec::new();

        for &addr in addrs {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let local = listener.local_addr().unwrap_or(addr);
                    info!(addr = %local, "call home listening");
                    let _ = events.send(CallHomeEvent::Listening { addr: local });
                    listeners.push(listener);
                }
                Err(err) if covered_by_dual_stack(&listeners, addr, &err) => {
                    debug!(%addr, "already covered by the dual-stack listener");
                }
                Err(err) => {
                    warn!(%addr, error = %err, "call home bind failed");
                    let _ = events.send(CallHomeEvent::BindFailed {
                        addr,
                        error: err.to_string(),
                    });
                }
            }
        }

        if listeners.is_empty() {
            return Err(ClientError::CallHome(format!(
                "could not listen on any of {}",
                addrs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok((Self { listeners, events }, receiver))
    }

    /// Addresses actually bound.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Waits for the first device to connect.
    ///
    /// Returns [`ClientError::Stopped`] once `stop` turns true. Failed
    /// accepts are reported and listening continues.
    pub async fn accept(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> ClientResult<(TcpStream, SocketAddr)> {
        loop {
            let accepted = tokio::select! {
                biased;
                Ok(_) = stop.wait_for(|stopped| *stopped) => {
                    info!("call home listener stopped");
                    return Err(ClientError::Stopped);
                }
                result = poll_fn(|cx| self.poll_accept(cx)) => result,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "call home connection");
                    let _ = self.events.send(CallHomeEvent::Attempt { peer });
                    return Ok((stream, peer));
                }
                Err(err) => {
                    warn!(error = %err, "call home accept failed");
                    let _ = self.events.send(CallHomeEvent::AcceptFailed {
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        for listener in &self.listeners {
            if let Poll::Ready(result) = listener.poll_accept(cx) {
                return Poll::Ready(result);
            }
        }
        Poll::Pending
    }
}

/// An IPv4 wildcard bind collides with an IPv6 wildcard listener on the
/// same port when the host maps IPv4 into IPv6.
fn covered_by_dual_stack(listeners: &[TcpListener], addr: SocketAddr, err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::AddrInUse
        && addr.is_ipv4()
        && addr.ip().is_unspecified()
        && listeners.iter().any(|l| {
            l.local_addr()
                .is_ok_and(|local| local.is_ipv6() && local.port() == addr.port())
        })
}
