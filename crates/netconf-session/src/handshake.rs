//! `<hello>` capability exchange.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use netconf_core::{Capabilities, negotiate_base};
use netconf_protocol::{Element, Hello};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{NetconfError, NetconfResult};
use crate::listener::{ListenerId, SessionListener};
use crate::session::SessionShared;

/// Default bound on the capability exchange.
pub const DEFAULT_HELLO_TIMEOUT: Duration = Duration::from_secs(60);

/// Progress of the capability exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    HelloSent,
    HelloReceived,
    TimedOut,
    Failed,
}

type HelloSender = oneshot::Sender<NetconfResult<Hello>>;

/// Transient listener waiting for the peer's hello.
///
/// Negotiates the base version inside the callback so the I/O loop can
/// switch framing before it decodes the next buffered message.
struct HelloListener {
    client_capabilities: Capabilities,
    shared: Arc<SessionShared>,
    outcome: Mutex<Option<HelloSender>>,
}

impl HelloListener {
    fn complete(&self, result: NetconfResult<Hello>) {
        let sender = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }
}

impl SessionListener for HelloListener {
    fn callback(&self, root: &Element, _raw: &str) -> NetconfResult<()> {
        if root.local_name() != "hello" {
            return Ok(());
        }
        let hello = Hello::parse(root)
            .map_err(|err| NetconfError::session(format!("malformed hello: {err}")))?;

        let base = negotiate_base(&self.client_capabilities, &hello.capabilities);
        self.shared.set_base(base);
        debug!(
            %base,
            server_capabilities = hello.capabilities.len(),
            "hello received"
        );
        self.complete(Ok(hello));
        Ok(())
    }

    fn errback(&self, error: &NetconfError) {
        self.complete(Err(error.clone()));
    }
}

/// One capability exchange, from listener registration to resolution.
pub(crate) struct Handshake {
    state: HandshakeState,
    listener_id: ListenerId,
    receiver: oneshot::Receiver<NetconfResult<Hello>>,
}

impl Handshake {
    /// Registers the hello listener on `shared`.
    pub(crate) fn register(shared: &Arc<SessionShared>, client_capabilities: Capabilities) -> Self {
        let (sender, receiver) = oneshot::channel();
        let listener = HelloListener {
            client_capabilities,
            shared: Arc::clone(shared),
            outcome: Mutex::new(Some(sender)),
        };
        let listener_id = shared.listeners.add(Arc::new(listener));
        Self {
            state: HandshakeState::Init,
            listener_id,
            receiver,
        }
    }

    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    fn transition(&mut self, next: HandshakeState) {
        debug!(from = ?self.state, to = ?next, "handshake");
        self.state = next;
    }

    pub(crate) fn hello_sent(&mut self) {
        self.transition(HandshakeState::HelloSent);
    }

    /// Waits for the peer's hello, then unregisters the listener.
    pub(crate) async fn finish(
        &mut self,
        shared: &SessionShared,
        timeout: Duration,
    ) -> NetconfResult<Hello> {
        let result = match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(Ok(hello))) => {
                self.transition(HandshakeState::HelloReceived);
                Ok(hello)
            }
            Ok(Ok(Err(err))) => {
                self.transition(HandshakeState::Failed);
                Err(err)
            }
            Ok(Err(_)) => {
                self.transition(HandshakeState::Failed);
                Err(NetconfError::session(
                    "session closed during capability exchange",
                ))
            }
            Err(_) => {
                self.transition(HandshakeState::TimedOut);
                Err(NetconfError::session("capability exchange timed out"))
            }
        };
        shared.listeners.remove(self.listener_id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netconf_core::{BASE_1_0, BASE_1_1, BaseVersion};
    use netconf_protocol::parse_document;

    fn server_hello(caps: &[&str]) -> String {
        let caps: String = caps
            .iter()
            .map(|c| format!("<capability>{c}</capability>"))
            .collect();
        format!(
            r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities>{caps}</capabilities><session-id>12</session-id></hello>"#
        )
    }

    fn deliver(shared: &SessionShared, raw: &str) {
        let root = parse_document(raw).unwrap();
        shared.listeners.dispatch(&root, raw);
    }

    async fn negotiate(client: &[&str], server: &[&str]) -> BaseVersion {
        let shared = Arc::new(SessionShared::new());
        let mut handshake = Handshake::register(&shared, Capabilities::new(client.iter().copied()));
        handshake.hello_sent();
        deliver(&shared, &server_hello(server));
        let hello = handshake
            .finish(&shared, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(hello.session_id, Some(12));
        assert_eq!(handshake.state(), HandshakeState::HelloReceived);
        assert!(shared.listeners.is_empty());
        shared.base()
    }

    #[tokio::test]
    async fn version_negotiation_matrix() {
        assert_eq!(negotiate(&[BASE_1_0], &[BASE_1_0]).await, BaseVersion::V1_0);
        assert_eq!(
            negotiate(&[BASE_1_0, BASE_1_1], &[BASE_1_0]).await,
            BaseVersion::V1_0
        );
        assert_eq!(
            negotiate(&[BASE_1_0], &[BASE_1_0, BASE_1_1]).await,
            BaseVersion::V1_0
        );
        assert_eq!(
            negotiate(&[BASE_1_0, BASE_1_1], &[BASE_1_0, BASE_1_1]).await,
            BaseVersion::V1_1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_hello() {
        let shared = Arc::new(SessionShared::new());
        let mut handshake = Handshake::register(&shared, Capabilities::default_client());
        handshake.hello_sent();

        let err = handshake
            .finish(&shared, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "session error: capability exchange timed out");
        assert_eq!(handshake.state(), HandshakeState::TimedOut);
        assert!(shared.listeners.is_empty());
    }

    #[tokio::test]
    async fn malformed_hello_fails_dispatch() {
        let shared = Arc::new(SessionShared::new());
        let mut handshake = Handshake::register(&shared, Capabilities::default_client());

        let raw = "<hello><session-id>nope</session-id></hello>";
        let root = parse_document(raw).unwrap();
        let outcome = shared.listeners.dispatch(&root, raw);
        let crate::listener::DispatchOutcome::ListenerFailed { cause } = outcome else {
            panic!("expected listener failure");
        };
        shared.listeners.broadcast_error(&cause);

        let err = handshake
            .finish(&shared, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed hello"));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }
}
