//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{ClientConfig, ConnectionConfig, TransportKind};
use crate::error::ClientResult;

/// netconf-tool - Talk NETCONF to network devices
#[derive(Debug, Parser)]
#[command(name = "netconf-tool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "NETCONF_TOOL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Also append logs to this file
    #[arg(long, env = "NETCONF_TOOL_LOG", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(flatten)]
    pub target: Target,

    #[command(subcommand)]
    pub command: Command,
}

/// Ad hoc device given on the command line instead of a configured session.
#[derive(Debug, Clone, Default, Args)]
pub struct Target {
    /// Device address (overrides the configured session)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Device port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Login name
    #[arg(long, short = 'u', global = true)]
    pub user: Option<String>,

    /// Transport: ssh or tcp
    #[arg(long, global = true)]
    pub transport: Option<TransportKind>,
}

impl Target {
    /// Picks the device to talk to.
    ///
    /// `--host` builds an ad hoc session; otherwise the named session is
    /// taken from the configuration, with `--port`, `--user` and
    /// `--transport` applied on top.
    pub fn resolve(
        &self,
        config: &ClientConfig,
        session: Option<&str>,
    ) -> ClientResult<ConnectionConfig> {
        let mut resolved = match &self.host {
            Some(host) => ConnectionConfig::direct(session.unwrap_or(host), host.clone()),
            None => config.session(session)?.clone(),
        };
        if let Some(port) = self.port {
            resolved.port = Some(port);
        }
        if let Some(user) = &self.user {
            resolved.username = Some(user.clone());
        }
        if let Some(transport) = self.transport {
            resolved.transport = transport;
        }
        Ok(resolved)
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and show the server's hello
    Hello {
        /// Configured session name
        session: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Send an operation read from a file or stdin
    Rpc {
        /// Configured session name
        session: Option<String>,

        /// File holding the operation, `-` for stdin
        #[arg(long, short, default_value = "-")]
        input: String,

        /// Seconds to wait for the reply
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Retrieve running configuration and state data
    Get {
        /// Configured session name
        session: Option<String>,

        /// Subtree filter
        #[arg(long)]
        filter: Option<String>,
    },

    /// Retrieve a configuration datastore
    GetConfig {
        /// Configured session name
        session: Option<String>,

        /// Source datastore: running, candidate, startup or a URL
        #[arg(long, default_value = "running")]
        source: String,

        /// Subtree filter
        #[arg(long)]
        filter: Option<String>,
    },

    /// Subscribe and print event notifications
    Listen {
        /// Configured session name
        session: Option<String>,

        /// Event stream to subscribe to
        #[arg(long)]
        stream: Option<String>,

        /// Stop after this many notifications
        #[arg(long)]
        count: Option<usize>,
    },

    /// Wait for one device to call home
    CallHome {
        /// Port to listen on
        #[arg(long, default_value_t = crate::config::DEFAULT_CALL_HOME_PORT)]
        port: u16,

        /// Seconds to wait for the device
        #[arg(long)]
        timeout: Option<u64>,

        /// Transport spoken on the accepted socket
        #[arg(long = "over", default_value = "tcp")]
        over: TransportKind,
    },

    /// Keep a session up, reconnecting when configured to
    Watch {
        /// Configured session name
        session: Option<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
