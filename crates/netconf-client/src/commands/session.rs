//! Commands that talk to a device over one session.

use std::path::Path;
use std::time::{Duration, Instant};

use netconf_core::format_elapsed;
use netconf_protocol::{Notification, RpcReply, pretty_xml};
use netconf_session::operations::{self, Datastore, Filter};
use netconf_session::{CloseReason, NetconfError, Session};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::config::{ConnectionConfig, SessionKind, SupervisorSettings, TransportKind};
use crate::connector::{Connector, SshCommandConnector, TcpConnector};
use crate::error::{ClientError, ClientResult};
use crate::supervisor::{Supervisor, SupervisorEvent};

/// Opens a client-initiated session to `target`.
pub async fn open(
    target: &ConnectionConfig,
    settings: &SupervisorSettings,
) -> ClientResult<Session> {
    if target.kind == SessionKind::CallHome {
        return Err(ClientError::config(format!(
            "session `{}` is a call home session; use `watch` or `call-home`",
            target.name
        )));
    }

    let transport = match target.transport {
        TransportKind::Tcp => TcpConnector.connect(target).await?,
        TransportKind::Ssh => SshCommandConnector::default().connect(target).await?,
    };
    let options = target.session_options(settings);
    let session = Session::connect(transport, target.peer(), options).await?;
    Ok(session)
}

/// Sends `<close-session/>`; failures only matter for the log.
async fn finish(session: &Session) {
    if let Err(err) = session.close_session().await {
        debug!(error = %err, "close-session failed");
    }
}

/// Connect and print what the server announced.
pub async fn hello(
    target: &ConnectionConfig,
    settings: &SupervisorSettings,
    json: bool,
) -> ClientResult<()> {
    let session = open(target, settings).await?;
    print_hello(&session, json)?;
    finish(&session).await;
    Ok(())
}

/// Prints session-id, negotiated base version and server capabilities.
pub fn print_hello(session: &Session, json: bool) -> ClientResult<()> {
    if json {
        let out = serde_json::json!({
            "peer": session.peer(),
            "session_id": session.session_id(),
            "base": session.base_version().to_string(),
            "capabilities": session.server_capabilities(),
        });
        let text = serde_json::to_string_pretty(&out).map_err(std::io::Error::from)?;
        println!("{text}");
        return Ok(());
    }

    println!("peer:       {}", session.peer());
    println!("session-id: {}", session.session_id());
    println!("framing:    {}", session.base_version());
    println!("capabilities:");
    for capability in session.server_capabilities().iter() {
        println!("  {capability}");
    }

    let modules: Vec<_> = session.server_capabilities().modules().collect();
    if !modules.is_empty() {
        println!("modules:");
        for (module, revision) in modules {
            match revision {
                Some(revision) => println!("  {module}@{revision}"),
                None => println!("  {module}"),
            }
        }
    }
    Ok(())
}

/// Send an operation read from `input` (`-` for stdin).
pub async fn rpc(
    target: &ConnectionConfig,
    settings: &SupervisorSettings,
    input: &str,
    timeout: Option<u64>,
) -> ClientResult<()> {
    let operation = read_input(input).await?;
    let session = open(target, settings).await?;

    let started = Instant::now();
    let (pending, sent) = session.dispatch(&operation)?;
    let message_id = pending.message_id().to_string();
    debug!(%message_id, rpc = %sent, "sent");

    let result = session
        .wait_reply(pending, timeout.map(Duration::from_secs))
        .await;
    let elapsed = session
        .round_trip(&message_id)
        .unwrap_or_else(|| started.elapsed());
    finish(&session).await;

    let reply = result?;
    print_reply(&reply, elapsed);
    reply_status(&reply)
}

async fn read_input(input: &str) -> ClientResult<String> {
    let text = if input == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        text
    } else {
        tokio::fs::read_to_string(Path::new(input)).await?
    };
    if text.trim().is_empty() {
        return Err(NetconfError::invalid_operation("no operation given").into());
    }
    Ok(text)
}

/// `<get>` with an optional filter.
pub async fn get(
    target: &ConnectionConfig,
    settings: &SupervisorSettings,
    filter: Option<&str>,
) -> ClientResult<()> {
    let session = open(target, settings).await?;
    let filter = filter.map(parse_filter);
    let result = request(&session, |s| {
        operations::get(s.server_capabilities(), filter.as_ref())
    })
    .await;
    finish(&session).await;
    result
}

/// `<get-config>` on `source` with an optional filter.
pub async fn get_config(
    target: &ConnectionConfig,
    settings: &SupervisorSettings,
    source: &str,
    filter: Option<&str>,
) -> ClientResult<()> {
    let source: Datastore = source.parse()?;
    let session = open(target, settings).await?;
    let filter = filter.map(parse_filter);
    let result = request(&session, |s| {
        operations::get_config(s.server_capabilities(), &source, filter.as_ref())
    })
    .await;
    finish(&session).await;
    result
}

async fn request(
    session: &Session,
    build: impl FnOnce(&Session) -> Result<String, NetconfError>,
) -> ClientResult<()> {
    let operation = build(session)?;
    let started = Instant::now();
    let reply = session.request(&operation).await?;
    let elapsed = reply
        .message_id
        .as_deref()
        .and_then(|id| session.round_trip(id))
        .unwrap_or_else(|| started.elapsed());
    print_reply(&reply, elapsed);
    reply_status(&reply)
}

/// A filter starting with `<` is a subtree filter, anything else XPath.
fn parse_filter(text: &str) -> Filter {
    let text = text.trim();
    if text.starts_with('<') {
        Filter::Subtree(text.to_string())
    } else {
        Filter::XPath(text.to_string())
    }
}

/// Prints the reply, each rpc-error field by field, and the round trip.
pub fn print_reply(reply: &RpcReply, elapsed: Duration) {
    println!("{}", pretty_xml(&reply.raw));
    for error in &reply.errors {
        println!();
        println!("{}:", if error.is_warning() { "rpc-warning" } else { "rpc-error" });
        for (field, value) in error.fields() {
            println!("  {field:<10} {value}");
        }
    }
    println!();
    println!("took {}", format_elapsed(elapsed));
}

fn reply_status(reply: &RpcReply) -> ClientResult<()> {
    match reply.error() {
        Some(error) => Err(NetconfError::Rpc(error.clone()).into()),
        None => Ok(()),
    }
}

/// Subscribe and print notifications until `count` or Ctrl-C.
pub async fn listen(
    target: &ConnectionConfig,
    settings: &SupervisorSettings,
    stream: Option<&str>,
    count: Option<usize>,
) -> ClientResult<()> {
    let session = open(target, settings).await?;
    let subscribe = operations::create_subscription(
        session.server_capabilities(),
        stream,
        None,
        None,
        None,
    )?;
    let reply = session.request(&subscribe).await?;
    reply_status(&reply)?;
    eprintln!("Subscribed to {}, waiting for notifications.", stream.unwrap_or("NETCONF"));

    let mut received = 0;
    let outcome = loop {
        if count.is_some_and(|count| received >= count) {
            break Ok(());
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            reason = session.closed() => break match reason {
                CloseReason::Requested => Ok(()),
                CloseReason::Lost(err) => Err(ClientError::from(err)),
            },
            notification = session.take_notification(true, None) => {
                if let Some(notification) = notification {
                    print_notification(&notification);
                    received += 1;
                }
            }
        }
    };

    if session.is_connected() {
        finish(&session).await;
    }
    outcome
}

/// Prints one notification with its arrival time.
pub fn print_notification(notification: &Notification) {
    println!(
        "[{}] {} {}",
        notification.received_at().format("%Y-%m-%d %H:%M:%S"),
        notification.event_time().unwrap_or("-"),
        notification.name().unwrap_or("notification"),
    );
    println!("{}", pretty_xml(notification.xml()));
}

/// Keep a session up under the supervisor until Ctrl-C.
pub async fn watch(target: &ConnectionConfig, settings: &SupervisorSettings) -> ClientResult<()> {
    match target.transport {
        TransportKind::Tcp => watch_with(target, settings, TcpConnector).await,
        TransportKind::Ssh => watch_with(target, settings, SshCommandConnector::default()).await,
    }
}

async fn watch_with<C: Connector>(
    target: &ConnectionConfig,
    settings: &SupervisorSettings,
    connector: C,
) -> ClientResult<()> {
    let (supervisor, mut events) = Supervisor::new(target.clone(), settings.clone(), connector);
    let handle = supervisor.handle();
    let task = supervisor.spawn();
    handle.connect()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => print_event(event),
                None => break,
            },
        }
    }

    let _ = handle.shutdown();
    if let Err(err) = task.await {
        warn!(error = %err, "supervisor task failed");
    }
    Ok(())
}

fn print_event(event: SupervisorEvent) {
    match event {
        SupervisorEvent::StatusChanged(status) => println!("status: {status}"),
        SupervisorEvent::Ready(session) => println!(
            "ready: {} ({}, {} capabilities)",
            session.peer(),
            session.base_version(),
            session.server_capabilities().len()
        ),
        SupervisorEvent::Notification(notification) => print_notification(&notification),
        SupervisorEvent::Error(message) => eprintln!("{message}"),
        SupervisorEvent::ReconnectScheduled { delay } => {
            debug!(delay_secs = delay.as_secs(), "reconnect scheduled");
        }
        SupervisorEvent::Info(message) => println!("{message}"),
    }
}
