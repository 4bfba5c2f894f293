//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/netconf-tool/config.toml` by default. Each `[[sessions]]`
//! entry describes one device:
//!
//! ```toml
//! [supervisor]
//! reconnect_delay = 60
//!
//! [[sessions]]
//! name = "r1"
//! host = "192.0.2.1"
//! username = "admin"
//! password = "pass::lab/r1"
//! auto_reconnect = true
//! ```
//!
//! `password` supports the `pass::` and `env::` references of
//! [`crate::secret`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use netconf_core::{BASE_1_0, Capabilities};
use netconf_session::SessionOptions;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Default NETCONF-over-SSH port.
pub const DEFAULT_PORT: u16 = 830;

/// Default NETCONF call-home port.
pub const DEFAULT_CALL_HOME_PORT: u16 = 4334;

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the netconf-tool client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection supervisor settings.
    pub supervisor: SupervisorSettings,

    /// Configured devices.
    pub sessions: Vec<ConnectionConfig>,
}

/// Connection supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Seconds to wait before reconnecting after an unexpected disconnect.
    pub reconnect_delay: u64,

    /// Seconds allowed for the `<hello>` exchange.
    pub hello_timeout: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: 60,
            hello_timeout: 60,
        }
    }
}

impl SupervisorSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout)
    }
}

/// Who opens the transport connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    /// The client connects to the device.
    #[default]
    Direct,
    /// The device connects to a port the client listens on.
    CallHome,
}

/// Byte stream carrying the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The `netconf` subsystem of the system `ssh` client.
    #[default]
    Ssh,
    /// Plain TCP.
    Tcp,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(Self::Ssh),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unknown transport `{other}` (expected ssh or tcp)")),
        }
    }
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Name used on the command line.
    pub name: String,

    /// Device address. Unused for call-home sessions.
    #[serde(default)]
    pub host: String,

    /// Port to connect to, or to listen on for call-home.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password or secret reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Connect and RPC timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Send transport keep-alives.
    #[serde(default)]
    pub keepalive: bool,

    /// Reconnect once after an unexpected disconnect.
    #[serde(default)]
    pub auto_reconnect: bool,

    #[serde(default)]
    pub kind: SessionKind,

    #[serde(default)]
    pub transport: TransportKind,

    /// Capabilities to advertise instead of the defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

fn default_timeout() -> u64 {
    60
}

impl ConnectionConfig {
    /// A direct session to `host` with default settings.
    pub fn direct(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: None,
            username: None,
            password: None,
            timeout: default_timeout(),
            keepalive: false,
            auto_reconnect: false,
            kind: SessionKind::Direct,
            transport: TransportKind::Ssh,
            capabilities: Vec::new(),
        }
    }

    /// A call-home session listening on `port`.
    pub fn call_home(name: impl Into<String>, port: u16) -> Self {
        Self {
            kind: SessionKind::CallHome,
            port: Some(port),
            ..Self::direct(name, "")
        }
    }

    /// Configured port, or the default for the session kind.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.kind {
            SessionKind::Direct => DEFAULT_PORT,
            SessionKind::CallHome => DEFAULT_CALL_HOME_PORT,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Endpoint shown in messages.
    pub fn peer(&self) -> String {
        match self.kind {
            SessionKind::Direct => format!("{}:{}", self.host, self.port()),
            SessionKind::CallHome => format!("call-home:{}", self.port()),
        }
    }

    /// Resolves the password reference, if any.
    pub fn resolve_password(&self) -> ClientResult<Option<String>> {
        self.password
            .as_deref()
            .map(crate::secret::resolve)
            .transpose()
            .map_err(|e| ClientError::config(format!("session `{}`: {}", self.name, e)))
    }

    /// Session options for this device.
    pub fn session_options(&self, supervisor: &SupervisorSettings) -> SessionOptions {
        let options = SessionOptions::default()
            .with_hello_timeout(supervisor.hello_timeout())
            .with_rpc_timeout(self.timeout());
        if self.capabilities.is_empty() {
            options
        } else {
            options.with_capabilities(Capabilities::new(self.capabilities.iter().cloned()))
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("session name must not be empty".into());
        }
        if self.kind == SessionKind::Direct && self.host.trim().is_empty() {
            return Err(format!("session `{}`: host must not be empty", self.name));
        }
        if self.port == Some(0) {
            return Err(format!("session `{}`: port must not be 0", self.name));
        }
        if self.timeout == 0 {
            return Err(format!("session `{}`: timeout must not be 0", self.name));
        }
        if !self.capabilities.is_empty()
            && !Capabilities::new(self.capabilities.iter().cloned()).contains(BASE_1_0)
        {
            return Err(format!(
                "session `{}`: capabilities must include {}",
                self.name, BASE_1_0
            ));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ClientError::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netconf-tool")
    }

    /// Looks a session up by name.
    ///
    /// With no name, a configuration holding exactly one session selects it.
    pub fn session(&self, name: Option<&str>) -> ClientResult<&ConnectionConfig> {
        match name {
            Some(name) => self
                .sessions
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| ClientError::config(format!("no session named `{name}`"))),
            None => match self.sessions.as_slice() {
                [only] => Ok(only),
                [] => Err(ClientError::config(
                    "no sessions configured; add a [[sessions]] entry or pass --host",
                )),
                _ => Err(ClientError::config(
                    "several sessions configured; name the one to use",
                )),
            },
        }
    }

    /// Checks every session entry and rejects duplicate names.
    pub fn validate(&self) -> ClientResult<()> {
        if self.supervisor.hello_timeout == 0 {
            return Err(ClientError::config("supervisor.hello_timeout must not be 0"));
        }

        let mut names = HashSet::new();
        for session in &self.sessions {
            session.validate().map_err(ClientError::Config)?;
            if !names.insert(session.name.as_str()) {
                return Err(ClientError::config(format!(
                    "duplicate session name `{}`",
                    session.name
                )));
            }
        }
        Ok(())
    }
}
