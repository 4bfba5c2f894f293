//! Wait for a device to call home.

use std::time::Duration;

use netconf_session::Session;
use tokio::sync::watch;
use tracing::debug;

use crate::callhome::CallHomeListener;
use crate::config::{ConnectionConfig, SupervisorSettings, TransportKind};
use crate::connector::{Connector, SshCommandConnector, TcpConnector};
use crate::error::{ClientError, ClientResult};

/// Listens on `port` until one device calls home, then prints its hello.
pub async fn run(
    port: u16,
    timeout: Option<u64>,
    over: TransportKind,
    settings: &SupervisorSettings,
) -> ClientResult<()> {
    let target = ConnectionConfig {
        transport: over,
        ..ConnectionConfig::call_home("call-home", port)
    };
    let (listener, mut events) = CallHomeListener::bind(target.port()).await?;

    let (stop_tx, mut stop) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });
    let deadline = tokio::time::sleep(timeout.map_or(Duration::MAX, Duration::from_secs));
    tokio::pin!(deadline);

    let (stream, peer) = loop {
        tokio::select! {
            Some(event) = events.recv() => eprintln!("{event}"),
            accepted = listener.accept(&mut stop) => break accepted?,
            _ = &mut deadline => {
                return Err(ClientError::CallHome(format!(
                    "no device called home within {}s",
                    timeout.unwrap_or_default()
                )));
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        eprintln!("{event}");
    }

    let transport = match over {
        TransportKind::Tcp => TcpConnector.adopt(stream, &target)?,
        TransportKind::Ssh => SshCommandConnector::default().adopt(stream, &target)?,
    };
    let options = target.session_options(settings);
    let session = Session::connect(transport, peer.to_string(), options).await?;
    super::session::print_hello(&session, false)?;

    if let Err(err) = session.close_session().await {
        debug!(error = %err, "close-session failed");
    }
    Ok(())
}
