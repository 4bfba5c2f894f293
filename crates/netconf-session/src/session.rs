//! The session actor.
//!
//! A [`Session`] owns one spawned I/O task per connection. The task is the
//! only reader and writer of the transport: it feeds received bytes to the
//! frame decoder, dispatches every completed document to the registered
//! listeners, and writes queued outbound messages in order. Callers talk to
//! it through an unbounded queue and observe it through a `watch` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use netconf_core::{BaseVersion, Capabilities};
use netconf_protocol::{
    DEFAULT_MAX_MESSAGE_SIZE, FrameDecoder, NamespaceDecl, Notification, RpcReply, build_hello,
    build_rpc, encode_frame, extract_operation, message_id_of, parse_document,
};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, info_span, trace, warn};

use crate::correlator::{AbortHandle, PendingRpc, RpcCorrelator, wait_reply};
use crate::error::{NetconfError, NetconfResult};
use crate::handshake::{DEFAULT_HELLO_TIMEOUT, Handshake};
use crate::ledger::TimestampLedger;
use crate::listener::{DispatchOutcome, ListenerId, ListenerRegistry, SessionListener};
use crate::notify::{NotificationQueue, notification_channel};
use crate::operations;
use crate::transport::Transport;

/// Default deadline for RPC replies.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

/// How long [`Session::close`] waits for the peer to end the stream.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 16 * 1024;

/// Lifecycle of a session as published to observers.
#[derive(Debug, Clone)]
pub enum SessionState {
    Connecting,
    Connected,
    Closed(CloseReason),
}

impl SessionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Why a session ended.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// Closed locally.
    Requested,
    /// The transport failed or the peer went away.
    Lost(NetconfError),
}

/// Parameters for [`Session::connect`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Capabilities advertised in our hello.
    pub capabilities: Capabilities,
    /// Namespace declarations for our hello, for devices that need them.
    pub namespaces: Vec<NamespaceDecl>,
    pub hello_timeout: Duration,
    pub rpc_timeout: Duration,
    pub max_message_size: usize,
    /// Parent for the session span.
    pub parent_span: Option<Span>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default_client(),
            namespaces: Vec::new(),
            hello_timeout: DEFAULT_HELLO_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            parent_span: None,
        }
    }
}

impl SessionOptions {
    /// Builder: set the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Builder: set hello namespace declarations.
    pub fn with_namespaces(mut self, namespaces: Vec<NamespaceDecl>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Builder: set the capability exchange timeout.
    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    /// Builder: set the default RPC timeout.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Builder: set the parent span.
    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.parent_span = Some(span);
        self
    }
}

/// State shared between the I/O task and session handles.
pub(crate) struct SessionShared {
    pub(crate) listeners: ListenerRegistry,
    connected: AtomicBool,
    closing: AtomicBool,
    base_1_1: AtomicBool,
    sent: Mutex<TimestampLedger>,
    received: Mutex<TimestampLedger>,
    state: watch::Sender<SessionState>,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            listeners: ListenerRegistry::new(),
            connected: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            base_1_1: AtomicBool::new(false),
            sent: Mutex::new(TimestampLedger::default()),
            received: Mutex::new(TimestampLedger::default()),
            state,
        }
    }

    pub(crate) fn base(&self) -> BaseVersion {
        if self.base_1_1.load(Ordering::SeqCst) {
            BaseVersion::V1_1
        } else {
            BaseVersion::V1_0
        }
    }

    pub(crate) fn set_base(&self, version: BaseVersion) {
        self.base_1_1
            .store(version == BaseVersion::V1_1, Ordering::SeqCst);
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Moves `Connecting` to `Connected`. Fails with the close reason when
    /// the I/O task ended first.
    fn mark_connected(&self) -> Result<(), CloseReason> {
        let mut ended = None;
        self.state.send_if_modified(|state| match state {
            SessionState::Connecting => {
                self.connected.store(true, Ordering::SeqCst);
                *state = SessionState::Connected;
                true
            }
            SessionState::Closed(reason) => {
                ended = Some(reason.clone());
                false
            }
            SessionState::Connected => false,
        });
        ended.map_or(Ok(()), Err)
    }

    /// `connected` and the published state change under the same lock.
    fn mark_closed(&self, reason: CloseReason) {
        self.state.send_modify(|state| {
            self.connected.store(false, Ordering::SeqCst);
            *state = SessionState::Closed(reason);
        });
    }

    fn record(ledger: &Mutex<TimestampLedger>, message_id: &str) {
        ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(message_id, Instant::now());
    }

    fn lookup(ledger: &Mutex<TimestampLedger>, message_id: &str) -> Option<Instant> {
        ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_id)
    }
}

enum Outbound {
    Message {
        xml: String,
        message_id: Option<String>,
    },
    Shutdown,
}

/// An established NETCONF session.
///
/// Only returned once the hello exchange has completed, so the session-id
/// and both capability sets are always known.
pub struct Session {
    peer: String,
    session_id: u32,
    client_capabilities: Capabilities,
    server_capabilities: Capabilities,
    rpc_timeout: Duration,
    shared: Arc<SessionShared>,
    correlator: Arc<RpcCorrelator>,
    notifications: NotificationQueue,
    outbound: mpsc::UnboundedSender<Outbound>,
    abort: AbortHandle,
    task: JoinHandle<()>,
    span: Span,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("session_id", &self.session_id)
            .field("base", &self.base_version())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Session {
    /// Runs the hello exchange over `transport` and starts the I/O task.
    ///
    /// `peer` names the remote end in logs and error messages.
    pub async fn connect<T: Transport>(
        transport: T,
        peer: impl Into<String>,
        options: SessionOptions,
    ) -> NetconfResult<Self> {
        let peer = peer.into();
        let span = match &options.parent_span {
            Some(parent) => info_span!(
                parent: parent,
                "netconf_session",
                %peer,
                session_id = tracing::field::Empty
            ),
            None => info_span!("netconf_session", %peer, session_id = tracing::field::Empty),
        };

        let shared = Arc::new(SessionShared::new());
        let correlator = Arc::new(RpcCorrelator::new());
        let (notification_listener, notifications) = notification_channel();
        shared.listeners.add(Arc::new(notification_listener));
        shared.listeners.add(correlator.clone());
        let mut handshake = Handshake::register(&shared, options.capabilities.clone());

        let hello = build_hello(&options.capabilities, &options.namespaces)?;
        let (outbound, queue) = mpsc::unbounded_channel();
        let task = tokio::spawn(
            run(
                transport,
                Arc::clone(&shared),
                hello,
                queue,
                options.max_message_size,
            )
            .instrument(span.clone()),
        );
        handshake.hello_sent();

        let hello = match handshake
            .finish(&shared, options.hello_timeout)
            .instrument(span.clone())
            .await
        {
            Ok(hello) => hello,
            Err(err) => {
                span.in_scope(|| {
                    warn!(state = ?handshake.state(), error = %err, "capability exchange failed")
                });
                task.abort();
                shared.mark_closed(CloseReason::Lost(err.clone()));
                return Err(err);
            }
        };

        let session_id = hello.session_id.unwrap_or_else(|| {
            span.in_scope(|| warn!("server hello carries no session-id, using 0"));
            0
        });
        span.record("session_id", session_id);
        if let Err(reason) = shared.mark_connected() {
            span.in_scope(|| warn!("session ended right after the capability exchange"));
            return Err(match reason {
                CloseReason::Lost(err) => err,
                CloseReason::Requested => NetconfError::NotConnected,
            });
        }
        span.in_scope(|| {
            info!(
                base = %shared.base(),
                server_capabilities = hello.capabilities.len(),
                "session established"
            )
        });

        Ok(Self {
            peer,
            session_id,
            client_capabilities: options.capabilities,
            server_capabilities: hello.capabilities,
            rpc_timeout: options.rpc_timeout,
            shared,
            correlator,
            notifications,
            outbound,
            abort: AbortHandle::new(),
            task,
            span,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn client_capabilities(&self) -> &Capabilities {
        &self.client_capabilities
    }

    pub fn server_capabilities(&self) -> &Capabilities {
        &self.server_capabilities
    }

    /// Negotiated base version, fixed for the session's lifetime.
    pub fn base_version(&self) -> BaseVersion {
        self.shared.base()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Resolves once the session has ended.
    pub async fn closed(&self) -> CloseReason {
        let mut state = self.shared.state.subscribe();
        loop {
            if let SessionState::Closed(reason) = &*state.borrow_and_update() {
                return reason.clone();
            }
            if state.changed().await.is_err() {
                return CloseReason::Requested;
            }
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Queues a complete document for sending. Never blocks.
    pub fn send(&self, xml: &str) -> NetconfResult<()> {
        let message_id = parse_document(xml)
            .ok()
            .and_then(|root| message_id_of(&root).map(str::to_string));
        self.enqueue(xml.to_string(), message_id)
    }

    fn enqueue(&self, xml: String, message_id: Option<String>) -> NetconfResult<()> {
        if !self.is_connected() {
            return Err(NetconfError::NotConnected);
        }
        self.outbound
            .send(Outbound::Message { xml, message_id })
            .map_err(|_| NetconfError::NotConnected)
    }

    /// Sends an operation as a new RPC.
    ///
    /// Returns the pending handle and the exact `<rpc>` document queued.
    pub fn dispatch(&self, operation: &str) -> NetconfResult<(PendingRpc, String)> {
        if !self.is_connected() {
            return Err(NetconfError::NotConnected);
        }
        let operation = extract_operation(operation)?;
        let pending = self.correlator.register();
        let message_id = pending.message_id().to_string();

        let sent = build_rpc(&message_id, &operation.body, &operation.namespaces)
            .map_err(NetconfError::from)
            .and_then(|raw| {
                self.enqueue(raw.clone(), Some(message_id.clone()))
                    .map(|()| raw)
            });
        match sent {
            Ok(raw) => {
                self.span.in_scope(|| {
                    debug!(%message_id, operation = %operation.name, "rpc dispatched")
                });
                Ok((pending, raw))
            }
            Err(err) => {
                self.correlator.forget(&message_id);
                Err(err)
            }
        }
    }

    /// Waits for a reply, bounded by `timeout` or the session default.
    ///
    /// See [`wait_reply`] for cancellation semantics.
    pub async fn wait_reply(
        &self,
        pending: PendingRpc,
        timeout: Option<Duration>,
    ) -> NetconfResult<RpcReply> {
        wait_reply(pending, timeout.unwrap_or(self.rpc_timeout), &self.abort)
            .instrument(self.span.clone())
            .await
    }

    /// Dispatches an operation and waits for its reply.
    pub async fn request(&self, operation: &str) -> NetconfResult<RpcReply> {
        let (pending, _) = self.dispatch(operation)?;
        self.wait_reply(pending, None).await
    }

    /// Handle that cancels the current reply waits on this session.
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    /// Takes the oldest queued notification.
    pub async fn take_notification(
        &self,
        block: bool,
        timeout: Option<Duration>,
    ) -> Option<Notification> {
        self.notifications.take(block, timeout).await
    }

    /// Time between sending a request and receiving its reply, if both
    /// are still in the ledgers.
    pub fn round_trip(&self, message_id: &str) -> Option<Duration> {
        let sent = SessionShared::lookup(&self.shared.sent, message_id)?;
        let received = SessionShared::lookup(&self.shared.received, message_id)?;
        received.checked_duration_since(sent)
    }

    /// Sends `<close-session/>`, waits for the reply, then closes locally.
    pub async fn close_session(&self) -> NetconfResult<RpcReply> {
        self.shared.closing.store(true, Ordering::SeqCst);
        let result = self.request(&operations::close_session()).await;
        self.close().await;
        result
    }

    /// Shuts the transport down without notifying the server.
    pub async fn close(&self) {
        if self.shared.state.borrow().is_closed() {
            return;
        }
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Outbound::Shutdown);

        let mut state = self.shared.state.subscribe();
        let ended = tokio::time::timeout(CLOSE_GRACE, state.wait_for(SessionState::is_closed))
            .await
            .is_ok();
        if !ended {
            self.span
                .in_scope(|| debug!("peer kept the transport open, stopping I/O task"));
            self.task.abort();
            self.shared.mark_closed(CloseReason::Requested);
        }
    }
}

/// I/O task body: runs the loop, then publishes how it ended.
async fn run<T: Transport>(
    transport: T,
    shared: Arc<SessionShared>,
    hello: String,
    queue: mpsc::UnboundedReceiver<Outbound>,
    max_message_size: usize,
) {
    let result = io_loop(transport, &shared, hello, queue, max_message_size).await;
    match result {
        Ok(()) => {
            info!("session closed");
            shared.mark_closed(CloseReason::Requested);
        }
        Err(err) => {
            warn!(error = %err, "session terminated");
            shared.listeners.broadcast_error(&err);
            shared.mark_closed(CloseReason::Lost(err));
        }
    }
}

/// The hello always goes out first and always in base:1.0 framing; every
/// later message uses the version negotiated at the time it is written.
async fn io_loop<T: Transport>(
    transport: T,
    shared: &SessionShared,
    hello: String,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    max_message_size: usize,
) -> NetconfResult<()> {
    let (mut reader, mut writer) = tokio::io::split(transport);
    let mut decoder = FrameDecoder::with_max_size(BaseVersion::V1_0, max_message_size);
    let mut chunk = vec![0u8; READ_CHUNK];

    write_frame(&mut writer, &hello, BaseVersion::V1_0, None).await?;

    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    if shared.is_closing() {
                        debug!("transport closed");
                        return Ok(());
                    }
                    return Err(NetconfError::SessionClosed {
                        buffered: decoder.buffered(),
                    });
                }
                trace!(bytes = n, "read");
                decoder.feed(&chunk[..n]);
                while let Some(document) = decoder.next_message()? {
                    dispatch_document(shared, &document)?;
                    decoder.set_version(shared.base());
                }
            }
            message = queue.recv() => match message {
                Some(Outbound::Message { xml, message_id }) => {
                    write_message(&mut writer, shared, &xml, message_id.as_deref()).await?;
                }
                Some(Outbound::Shutdown) => {
                    debug!("shutting down transport");
                    shared.closing.store(true, Ordering::SeqCst);
                    writer.shutdown().await?;
                }
                None => {
                    shared.closing.store(true, Ordering::SeqCst);
                    let _ = writer.shutdown().await;
                    return Ok(());
                }
            },
        }
    }
}

fn dispatch_document(shared: &SessionShared, raw: &str) -> NetconfResult<()> {
    let root = match parse_document(raw) {
        Ok(root) => root,
        Err(err) => {
            warn!(error = %err, bytes = raw.len(), "dropping malformed message");
            return Ok(());
        }
    };

    let message_id = message_id_of(&root);
    if let Some(id) = message_id {
        SessionShared::record(&shared.received, id);
    }
    debug!(root = %root.name(), message_id, bytes = raw.len(), "received message");
    trace!(xml = raw, "received");

    match shared.listeners.dispatch(&root, raw) {
        DispatchOutcome::Delivered => Ok(()),
        DispatchOutcome::ListenerFailed { cause } => Err(cause),
    }
}

async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    shared: &SessionShared,
    xml: &str,
    message_id: Option<&str>,
) -> NetconfResult<()> {
    if let Some(id) = message_id {
        SessionShared::record(&shared.sent, id);
    }
    write_frame(writer, xml, shared.base(), message_id).await
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    xml: &str,
    version: BaseVersion,
    message_id: Option<&str>,
) -> NetconfResult<()> {
    let frame = encode_frame(xml, version)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    debug!(message_id, base = %version, bytes = frame.len(), "sent message");
    trace!(xml, "sent");
    Ok(())
}
