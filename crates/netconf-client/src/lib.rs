//! Connection supervisor, call-home listener, transports and CLI
//!
//! This crate provides the `netconf-tool` command-line interface.

pub mod callhome;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connector;
pub mod error;
pub mod secret;
pub mod supervisor;

pub use callhome::{CallHomeEvent, CallHomeListener};
pub use cli::Cli;
pub use config::{ClientConfig, ConnectionConfig, SessionKind, SupervisorSettings, TransportKind};
pub use connector::{Connector, SshCommandConnector, TcpConnector};
pub use error::{ClientError, ClientResult};
pub use supervisor::{
    ConnectionStatus, Supervisor, SupervisorCommand, SupervisorEvent, SupervisorHandle,
};
