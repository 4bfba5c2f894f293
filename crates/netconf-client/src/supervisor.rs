//! Connection supervisor.
//!
//! The supervisor owns one configured device. It decides when a session
//! is opened (client-initiated or call home), watches it for loss, and
//! schedules a single reconnect after an unexpected disconnect when the
//! device has `auto_reconnect` set. Commands come in through a
//! [`SupervisorHandle`]; everything that happens goes out as a
//! [`SupervisorEvent`].

use std::sync::Arc;
use std::time::Duration;

use netconf_protocol::Notification;
use netconf_session::{CloseReason, Session};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::callhome::{CallHomeEvent, CallHomeListener};
use crate::config::{ConnectionConfig, SessionKind, SupervisorSettings};
use crate::connector::Connector;
use crate::error::{ClientError, ClientResult};

/// Commands that can be sent to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    /// Open a session unless one is already up.
    Connect,
    /// Close the current session and open a new one.
    Reconnect,
    /// Close the session. Never followed by an automatic reconnect.
    Disconnect,
    /// Close the session and stop the supervisor.
    Shutdown,
}

/// Connection state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    /// Waiting for a device to call home.
    Listening,
    Connected { session_id: u32 },
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Listening => f.write_str("listening for call home"),
            Self::Connected { session_id } => write!(f, "connected (session-id {session_id})"),
        }
    }
}

/// Something the supervisor reports.
#[derive(Debug)]
pub enum SupervisorEvent {
    StatusChanged(ConnectionStatus),
    /// A new session is ready for requests.
    Ready(Arc<Session>),
    Notification(Notification),
    /// A user-visible failure message.
    Error(String),
    ReconnectScheduled { delay: Duration },
    Info(String),
}

enum Flow {
    Continue,
    Shutdown,
}

enum Attempt {
    Done(ClientResult<Session>),
    Interrupted(Option<SupervisorCommand>),
}

/// Supervises the sessions of one device.
pub struct Supervisor<C> {
    worker: Worker<C>,
    command_tx: mpsc::UnboundedSender<SupervisorCommand>,
    command_rx: mpsc::UnboundedReceiver<SupervisorCommand>,
}

struct Worker<C> {
    config: ConnectionConfig,
    settings: SupervisorSettings,
    connector: C,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    session: Option<Arc<Session>>,
    reconnect_at: Option<Instant>,
    span: Span,
}

impl<C: Connector> Supervisor<C> {
    /// Creates a supervisor and the receiver for its events.
    pub fn new(
        config: ConnectionConfig,
        settings: SupervisorSettings,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let span = info_span!("supervisor", name = %config.name, peer = %config.peer());
        let worker = Worker {
            config,
            settings,
            connector,
            events,
            session: None,
            reconnect_at: None,
            span,
        };
        (
            Self {
                worker,
                command_tx,
                command_rx,
            },
            event_rx,
        )
    }

    /// Returns a handle for sending commands to the supervisor.
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Runs the supervisor on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        let span = self.worker.span.clone();
        tokio::spawn(self.run().instrument(span))
    }

    /// Runs the supervisor loop until shutdown or until every handle is gone.
    pub async fn run(self) {
        let Self {
            mut worker,
            command_tx,
            mut command_rx,
        } = self;
        drop(command_tx);

        info!("supervisor started");
        loop {
            let session = worker.session.clone();
            let reconnect_at = worker.reconnect_at;

            tokio::select! {
                command = command_rx.recv() => {
                    let flow = match command {
                        Some(SupervisorCommand::Connect) => worker.connect(&mut command_rx).await,
                        Some(SupervisorCommand::Reconnect) => {
                            worker.reconnect(&mut command_rx).await
                        }
                        Some(SupervisorCommand::Disconnect) => {
                            worker.disconnect().await;
                            Flow::Continue
                        }
                        Some(SupervisorCommand::Shutdown) | None => Flow::Shutdown,
                    };
                    if let Flow::Shutdown = flow {
                        break;
                    }
                }
                reason = session_closed(session.as_deref()) => {
                    worker.session_closed(reason);
                }
                Some(notification) = next_notification(session.as_deref()) => {
                    worker.emit(SupervisorEvent::Notification(notification));
                }
                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() =>
                {
                    worker.reconnect_at = None;
                    info!("reconnecting after unexpected disconnect");
                    if let Flow::Shutdown = worker.connect(&mut command_rx).await {
                        break;
                    }
                }
            }
        }

        worker.disconnect().await;
        info!("supervisor stopped");
    }
}

impl<C: Connector> Worker<C> {
    fn emit(&self, event: SupervisorEvent) {
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: ConnectionStatus) {
        debug!(?status, "status changed");
        self.emit(SupervisorEvent::StatusChanged(status));
    }

    async fn connect(&mut self, commands: &mut mpsc::UnboundedReceiver<SupervisorCommand>) -> Flow {
        if self.session.as_ref().is_some_and(|s| s.is_connected()) {
            self.emit(SupervisorEvent::Info(format!(
                "Already connected to {}.",
                self.config.peer()
            )));
            return Flow::Continue;
        }
        self.reconnect_at = None;
        self.set_status(ConnectionStatus::Connecting);

        let attempt = tokio::select! {
            result = self.establish() => Attempt::Done(result),
            command = interruption(commands) => Attempt::Interrupted(command),
        };

        match attempt {
            Attempt::Done(Ok(session)) => {
                let session = Arc::new(session);
                info!(session_id = session.session_id(), "session established");
                self.set_status(ConnectionStatus::Connected {
                    session_id: session.session_id(),
                });
                self.emit(SupervisorEvent::Ready(Arc::clone(&session)));
                self.session = Some(session);
                Flow::Continue
            }
            Attempt::Done(Err(err)) => {
                error!(error = %err, "connect failed");
                self.emit(SupervisorEvent::Error(format!(
                    "Could not connect to {}: {}",
                    self.config.peer(),
                    err
                )));
                self.set_status(ConnectionStatus::Disconnected);
                Flow::Continue
            }
            Attempt::Interrupted(Some(SupervisorCommand::Disconnect)) => {
                info!("connection attempt canceled");
                self.set_status(ConnectionStatus::Disconnected);
                Flow::Continue
            }
            Attempt::Interrupted(_) => {
                self.set_status(ConnectionStatus::Disconnected);
                Flow::Shutdown
            }
        }
    }

    async fn establish(&self) -> ClientResult<Session> {
        let options = self
            .config
            .session_options(&self.settings)
            .with_parent_span(self.span.clone());

        match self.config.kind {
            SessionKind::Direct => {
                let transport = self.connector.connect(&self.config).await?;
                Ok(Session::connect(transport, self.config.peer(), options).await?)
            }
            SessionKind::CallHome => {
                let (listener, mut events) = CallHomeListener::bind(self.config.port()).await?;
                self.set_status(ConnectionStatus::Listening);

                let (_stop_tx, mut stop) = watch::channel(false);
                let accepted = loop {
                    tokio::select! {
                        Some(event) = events.recv() => self.call_home_event(event),
                        accepted = listener.accept(&mut stop) => break accepted?,
                    }
                };
                while let Ok(event) = events.try_recv() {
                    self.call_home_event(event);
                }

                let (stream, peer) = accepted;
                let transport = self.connector.adopt(stream, &self.config)?;
                Ok(Session::connect(transport, peer.to_string(), options).await?)
            }
        }
    }

    fn call_home_event(&self, event: CallHomeEvent) {
        let message = event.to_string();
        match event {
            CallHomeEvent::BindFailed { .. } | CallHomeEvent::AcceptFailed { .. } => {
                self.emit(SupervisorEvent::Error(message))
            }
            CallHomeEvent::Listening { .. } | CallHomeEvent::Attempt { .. } => {
                self.emit(SupervisorEvent::Info(message))
            }
        }
    }

    async fn reconnect(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<SupervisorCommand>,
    ) -> Flow {
        if self.config.kind == SessionKind::CallHome {
            warn!("reconnect requested for a call home session");
            self.emit(SupervisorEvent::Error(format!(
                "{}: call home sessions cannot be reconnected; the device has to call home again.",
                self.config.peer()
            )));
            return Flow::Continue;
        }
        self.disconnect().await;
        self.connect(commands).await
    }

    async fn disconnect(&mut self) {
        self.reconnect_at = None;
        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(err) = session.close_session().await {
            debug!(error = %err, "close-session failed, transport closed anyway");
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn session_closed(&mut self, reason: CloseReason) {
        if self.session.take().is_none() {
            return;
        }
        let peer = self.config.peer();

        match reason {
            CloseReason::Requested => {
                info!("session closed");
            }
            CloseReason::Lost(err) => {
                warn!(error = %err, "session terminated unexpectedly");
                let message = match (self.config.auto_reconnect, self.config.kind) {
                    (true, SessionKind::Direct) => {
                        let delay = self.settings.reconnect_delay();
                        self.reconnect_at = Some(Instant::now() + delay);
                        self.emit(SupervisorEvent::ReconnectScheduled { delay });
                        format!(
                            "{peer}: Session was terminated unexpectedly and will be reconnected in {} seconds.",
                            delay.as_secs()
                        )
                    }
                    (true, SessionKind::CallHome) => format!(
                        "{peer}: Session was terminated unexpectedly. Call home sessions are not reconnected automatically."
                    ),
                    (false, _) => format!("{peer}: Session was terminated unexpectedly."),
                };
                self.emit(SupervisorEvent::Error(message));
            }
        }
        self.set_status(ConnectionStatus::Disconnected);
    }
}

async fn session_closed(session: Option<&Session>) -> CloseReason {
    match session {
        Some(session) => session.closed().await,
        None => std::future::pending().await,
    }
}

async fn next_notification(session: Option<&Session>) -> Option<Notification> {
    match session {
        Some(session) => session.take_notification(true, None).await,
        None => std::future::pending().await,
    }
}

/// Waits for a command that interrupts a connection attempt.
async fn interruption(
    commands: &mut mpsc::UnboundedReceiver<SupervisorCommand>,
) -> Option<SupervisorCommand> {
    loop {
        match commands.recv().await {
            Some(SupervisorCommand::Connect | SupervisorCommand::Reconnect) => {
                debug!("ignoring connect while a connection attempt is running");
            }
            other => return other,
        }
    }
}

/// Handle for sending commands to a running supervisor.
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
    command_tx: mpsc::UnboundedSender<SupervisorCommand>,
}

impl SupervisorHandle {
    fn send(&self, command: SupervisorCommand) -> ClientResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| ClientError::Stopped)
    }

    pub fn connect(&self) -> ClientResult<()> {
        self.send(SupervisorCommand::Connect)
    }

    pub fn reconnect(&self) -> ClientResult<()> {
        self.send(SupervisorCommand::Reconnect)
    }

    pub fn disconnect(&self) -> ClientResult<()> {
        self.send(SupervisorCommand::Disconnect)
    }

    pub fn shutdown(&self) -> ClientResult<()> {
        self.send(SupervisorCommand::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use netconf_session::{BoxedTransport, NetconfError};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpStream;

    const SERVER_HELLO: &str = concat!(
        r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">"#,
        "<capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities>",
        "<session-id>7</session-id></hello>]]>]]>"
    );

    struct FakeConnector {
        peers: mpsc::UnboundedSender<DuplexStream>,
        attempts: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl FakeConnector {
        fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
            let (peers, rx) = mpsc::unbounded_channel();
            let connector = Self {
                peers,
                attempts: Arc::new(AtomicUsize::new(0)),
                refuse: false,
            };
            (connector, rx)
        }
    }

    impl Connector for FakeConnector {
        async fn connect(&self, _config: &ConnectionConfig) -> ClientResult<BoxedTransport> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(NetconfError::transport("connection refused").into());
            }
            let (client, server) = tokio::io::duplex(64 * 1024);
            let _ = self.peers.send(server);
            Ok(Box::new(client))
        }

        fn adopt(
            &self,
            stream: TcpStream,
            _config: &ConnectionConfig,
        ) -> ClientResult<BoxedTransport> {
            Ok(Box::new(stream))
        }
    }

    async fn read_message<S: AsyncRead + Unpin>(stream: &mut S) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        while !buf.ends_with(b"]]>]]>") {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed the transport");
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(buf).unwrap()
    }

    async fn serve_hello<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S) -> S {
        let hello = read_message(&mut stream).await;
        assert!(hello.contains("<hello"));
        stream.write_all(SERVER_HELLO.as_bytes()).await.unwrap();
        stream
    }

    async fn wait_for(
        events: &mut mpsc::UnboundedReceiver<SupervisorEvent>,
        mut matches: impl FnMut(&SupervisorEvent) -> bool,
    ) -> SupervisorEvent {
        loop {
            let event = events.recv().await.expect("supervisor stopped");
            if matches(&event) {
                return event;
            }
        }
    }

    fn is_connected(event: &SupervisorEvent) -> bool {
        matches!(
            event,
            SupervisorEvent::StatusChanged(ConnectionStatus::Connected { session_id: 7 })
        )
    }

    fn error_text(event: SupervisorEvent) -> String {
        match event {
            SupervisorEvent::Error(message) => message,
            other => panic!("expected an error event, got {other:?}"),
        }
    }

    fn direct(auto_reconnect: bool) -> ConnectionConfig {
        ConnectionConfig {
            auto_reconnect,
            ..ConnectionConfig::direct("r1", "192.0.2.1")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_loss_schedules_one_reconnect() {
        let (connector, mut peers) = FakeConnector::new();
        let attempts = Arc::clone(&connector.attempts);
        let (supervisor, mut events) =
            Supervisor::new(direct(true), SupervisorSettings::default(), connector);
        let handle = supervisor.handle();
        let task = supervisor.spawn();

        handle.connect().unwrap();
        let server = serve_hello(peers.recv().await.unwrap()).await;
        wait_for(&mut events, is_connected).await;
        let session = match wait_for(&mut events, |e| matches!(e, SupervisorEvent::Ready(_))).await
        {
            SupervisorEvent::Ready(session) => session,
            _ => unreachable!(),
        };
        assert_eq!(session.session_id(), 7);

        let lost_at = Instant::now();
        drop(server);

        let scheduled = wait_for(&mut events, |e| {
            matches!(e, SupervisorEvent::ReconnectScheduled { .. })
        })
        .await;
        assert!(matches!(
            scheduled,
            SupervisorEvent::ReconnectScheduled { delay } if delay == Duration::from_secs(60)
        ));
        let message = error_text(
            wait_for(&mut events, |e| matches!(e, SupervisorEvent::Error(_))).await,
        );
        assert_eq!(
            message,
            "192.0.2.1:830: Session was terminated unexpectedly and will be reconnected in 60 seconds."
        );

        let second = peers.recv().await.unwrap();
        assert!(lost_at.elapsed() >= Duration::from_secs(60));
        let _server = serve_hello(second).await;
        wait_for(&mut events, is_connected).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn loss_without_auto_reconnect_is_reported_once() {
        let (connector, mut peers) = FakeConnector::new();
        let (supervisor, mut events) =
            Supervisor::new(direct(false), SupervisorSettings::default(), connector);
        let handle = supervisor.handle();
        let task = supervisor.spawn();

        handle.connect().unwrap();
        let mut server = serve_hello(peers.recv().await.unwrap()).await;
        wait_for(&mut events, is_connected).await;

        server
            .write_all(
                concat!(
                    r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0">"#,
                    "<eventTime>2024-05-01T10:00:00Z</eventTime><link-down/></notification>]]>]]>"
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        let notification = match wait_for(&mut events, |e| {
            matches!(e, SupervisorEvent::Notification(_))
        })
        .await
        {
            SupervisorEvent::Notification(n) => n,
            _ => unreachable!(),
        };
        assert_eq!(notification.name(), Some("link-down"));

        drop(server);
        let message = error_text(
            wait_for(&mut events, |e| matches!(e, SupervisorEvent::Error(_))).await,
        );
        assert_eq!(message, "192.0.2.1:830: Session was terminated unexpectedly.");
        assert!(matches!(
            events.recv().await,
            Some(SupervisorEvent::StatusChanged(ConnectionStatus::Disconnected))
        ));

        let retry = tokio::time::timeout(Duration::from_secs(300), peers.recv()).await;
        assert!(retry.is_err(), "no reconnect without auto_reconnect");

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn user_disconnect_never_reconnects() {
        let (connector, mut peers) = FakeConnector::new();
        let (supervisor, mut events) =
            Supervisor::new(direct(true), SupervisorSettings::default(), connector);
        let handle = supervisor.handle();
        let task = supervisor.spawn();

        handle.connect().unwrap();
        let mut server = serve_hello(peers.recv().await.unwrap()).await;
        wait_for(&mut events, is_connected).await;

        let device = tokio::spawn(async move {
            let rpc = read_message(&mut server).await;
            assert!(rpc.contains("<close-session/>"));
            server
                .write_all(br#"<rpc-reply message-id="1"><ok/></rpc-reply>]]>]]>"#)
                .await
                .unwrap();
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
        });

        handle.disconnect().unwrap();
        let event = wait_for(&mut events, |e| {
            matches!(
                e,
                SupervisorEvent::StatusChanged(ConnectionStatus::Disconnected)
                    | SupervisorEvent::Error(_)
            )
        })
        .await;
        assert!(matches!(
            event,
            SupervisorEvent::StatusChanged(ConnectionStatus::Disconnected)
        ));
        device.await.unwrap();

        let retry = tokio::time::timeout(Duration::from_secs(300), peers.recv()).await;
        assert!(retry.is_err(), "user disconnect must not reconnect");
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SupervisorEvent::Error(_)), "{event:?}");
        }

        handle.shutdown().unwrap();
        task.await.unwrap();
        assert!(handle.connect().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_is_not_retried() {
        let (mut connector, _peers) = FakeConnector::new();
        connector.refuse = true;
        let attempts = Arc::clone(&connector.attempts);
        let (supervisor, mut events) =
            Supervisor::new(direct(true), SupervisorSettings::default(), connector);
        let handle = supervisor.handle();
        let task = supervisor.spawn();

        handle.connect().unwrap();
        let message = error_text(
            wait_for(&mut events, |e| matches!(e, SupervisorEvent::Error(_))).await,
        );
        assert!(message.starts_with("Could not connect to 192.0.2.1:830:"));
        assert!(message.contains("connection refused"));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        task.abort();
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn is_listening(event: &SupervisorEvent) -> bool {
        matches!(
            event,
            SupervisorEvent::StatusChanged(ConnectionStatus::Listening)
        )
    }

    #[tokio::test]
    async fn call_home_device_gets_a_session() {
        let (connector, _peers) = FakeConnector::new();
        let port = free_port();
        let (supervisor, mut events) = Supervisor::new(
            ConnectionConfig::call_home("home", port),
            SupervisorSettings::default(),
            connector,
        );
        let handle = supervisor.handle();
        let task = supervisor.spawn();

        handle.connect().unwrap();
        wait_for(&mut events, is_listening).await;

        let device = tokio::spawn(async move {
            let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
            let mut stream = serve_hello(stream).await;
            let rpc = read_message(&mut stream).await;
            assert!(rpc.contains("<close-session/>"));
            stream
                .write_all(br#"<rpc-reply message-id="1"><ok/></rpc-reply>]]>]]>"#)
                .await
                .unwrap();
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });

        wait_for(&mut events, is_connected).await;
        let session = match wait_for(&mut events, |e| matches!(e, SupervisorEvent::Ready(_))).await
        {
            SupervisorEvent::Ready(session) => session,
            _ => unreachable!(),
        };
        assert_eq!(session.session_id(), 7);
        assert!(session.peer().starts_with("127.0.0.1:"));

        handle.shutdown().unwrap();
        task.await.unwrap();
        device.await.unwrap();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn disconnect_while_listening_produces_no_session() {
        let (connector, _peers) = FakeConnector::new();
        let port = free_port();
        let (supervisor, mut events) = Supervisor::new(
            ConnectionConfig::call_home("home", port),
            SupervisorSettings::default(),
            connector,
        );
        let handle = supervisor.handle();
        let task = supervisor.spawn();

        handle.connect().unwrap();
        wait_for(&mut events, is_listening).await;
        handle.disconnect().unwrap();

        let event = wait_for(&mut events, |e| {
            matches!(
                e,
                SupervisorEvent::StatusChanged(ConnectionStatus::Disconnected)
                    | SupervisorEvent::Ready(_)
            )
        })
        .await;
        assert!(matches!(
            event,
            SupervisorEvent::StatusChanged(ConnectionStatus::Disconnected)
        ));

        let addr = std::net::SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let (rebound, _) = CallHomeListener::bind_addrs(&[addr]).await.unwrap();
        assert_eq!(rebound.local_addrs(), vec![addr]);

        handle.shutdown().unwrap();
        task.await.unwrap();
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SupervisorEvent::Ready(_)), "{event:?}");
        }
    }

    #[tokio::test]
    async fn call_home_reconnect_is_an_error() {
        let (connector, _peers) = FakeConnector::new();
        let config = ConnectionConfig {
            auto_reconnect: true,
            ..ConnectionConfig::call_home("home", 4334)
        };
        let (supervisor, mut events) =
            Supervisor::new(config, SupervisorSettings::default(), connector);
        let handle = supervisor.handle();
        let task = supervisor.spawn();

        handle.reconnect().unwrap();
        let message = error_text(events.recv().await.unwrap());
        assert!(message.contains("call home sessions cannot be reconnected"));

        handle.shutdown().unwrap();
        task.await.unwrap();
    }
}
