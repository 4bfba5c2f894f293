//! Transport connectors.
//!
//! A [`Connector`] opens the byte stream a [`netconf_session::Session`]
//! runs over. Authentication belongs to the transport; the session only
//! sees bytes.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use netconf_session::{BoxedTransport, NetconfError};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{ClientError, ClientResult};

/// Seconds between keep-alive probes when `keepalive` is set.
pub const KEEPALIVE_INTERVAL: u64 = 60;

/// Opens transports for a configured device.
pub trait Connector: Send + Sync + 'static {
    /// Opens a client-initiated transport to `config.host`.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = ClientResult<BoxedTransport>> + Send;

    /// Wraps a socket accepted by the call-home listener.
    fn adopt(&self, stream: TcpStream, config: &ConnectionConfig) -> ClientResult<BoxedTransport>;
}

/// NETCONF over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    async fn connect(&self, config: &ConnectionConfig) -> ClientResult<BoxedTransport> {
        let addr = (config.host.as_str(), config.port());
        let stream = match tokio::time::timeout(config.timeout(), TcpStream::connect(addr)).await {
            Ok(result) => result.map_err(NetconfError::from)?,
            Err(_) => {
                return Err(NetconfError::transport(format!(
                    "connect to {} timed out after {}s",
                    config.peer(),
                    config.timeout
                ))
                .into());
            }
        };
        stream.set_nodelay(true).map_err(NetconfError::from)?;
        debug!(peer = %config.peer(), "tcp transport open");
        Ok(Box::new(stream))
    }

    fn adopt(&self, stream: TcpStream, _config: &ConnectionConfig) -> ClientResult<BoxedTransport> {
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// NETCONF over the `netconf` subsystem of the system `ssh` client.
///
/// Key and agent authentication are handled by `ssh` itself. A configured
/// password is handed over through `sshpass -e`.
#[derive(Debug, Clone)]
pub struct SshCommandConnector {
    program: String,
}

impl Default for SshCommandConnector {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
        }
    }
}

impl SshCommandConnector {
    /// Uses `program` instead of `ssh` from `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, config: &ConnectionConfig, password: Option<String>) -> Command {
        let mut cmd = match password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(&self.program).env("SSHPASS", password);
                cmd
            }
            None => Command::new(&self.program),
        };

        cmd.arg("-p").arg(config.port().to_string());
        if let Some(user) = &config.username {
            cmd.arg("-l").arg(user);
        }
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", config.timeout));
        if config.keepalive {
            cmd.arg("-o")
                .arg(format!("ServerAliveInterval={KEEPALIVE_INTERVAL}"));
        }
        cmd.arg("-s").arg(&config.host).arg("netconf");

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl Connector for SshCommandConnector {
    async fn connect(&self, config: &ConnectionConfig) -> ClientResult<BoxedTransport> {
        let password = config.resolve_password()?;
        let mut child = self.command(config, password).spawn().map_err(|e| {
            NetconfError::transport(format!("failed to spawn {}: {}", self.program, e))
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(NetconfError::transport("ssh child has no stdio pipes").into());
        };
        debug!(peer = %config.peer(), pid = ?child.id(), "ssh subsystem started");
        Ok(Box::new(SshChannel {
            _child: child,
            stdin,
            stdout,
        }))
    }

    fn adopt(&self, _stream: TcpStream, config: &ConnectionConfig) -> ClientResult<BoxedTransport> {
        Err(ClientError::from(NetconfError::transport(format!(
            "session `{}`: the ssh transport cannot run over an accepted call-home socket; use transport = \"tcp\"",
            config.name
        ))))
    }
}

/// Byte stream over the stdin/stdout of an `ssh` child process.
///
/// The child is killed when the channel is dropped.
struct SshChannel {
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl AsyncRead for SshChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for SshChannel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stdin).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}
