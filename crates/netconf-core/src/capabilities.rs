//! NETCONF capability sets.
//!
//! A capability is a URI advertised in a `<hello>` message. Peers exchange
//! their sets exactly once per session; after that the set is immutable.
//!
//! Lookups accept either the full URI or the shorthand used throughout
//! RFC 6241, e.g. `:candidate` or `:confirmed-commit:1.1`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// NETCONF base protocol 1.0 (end-of-message framing).
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// NETCONF base protocol 1.1 (chunked framing).
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

const BASE_PREFIX: &str = "urn:ietf:params:netconf:base:";
const CAPABILITY_PREFIX: &str = "urn:ietf:params:netconf:capability:";

/// Capabilities advertised by this client unless configured otherwise.
const DEFAULT_CLIENT_CAPABILITIES: &[&str] = &[
    BASE_1_0,
    BASE_1_1,
    "urn:ietf:params:netconf:capability:writable-running:1.0",
    "urn:ietf:params:netconf:capability:candidate:1.0",
    "urn:ietf:params:netconf:capability:confirmed-commit:1.0",
    "urn:ietf:params:netconf:capability:rollback-on-error:1.0",
    "urn:ietf:params:netconf:capability:startup:1.0",
    "urn:ietf:params:netconf:capability:url:1.0?scheme=http,ftp,file,https,sftp",
    "urn:ietf:params:netconf:capability:validate:1.0",
    "urn:ietf:params:netconf:capability:xpath:1.0",
    "urn:ietf:params:netconf:capability:notification:1.0",
    "urn:ietf:params:netconf:capability:interleave:1.0",
];

/// Base protocol version negotiated for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseVersion {
    /// `]]>]]>` terminated messages.
    #[default]
    #[serde(rename = "1.0")]
    V1_0,
    /// Chunked framing.
    #[serde(rename = "1.1")]
    V1_1,
}

impl fmt::Display for BaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1_0 => f.write_str("base:1.0"),
            Self::V1_1 => f.write_str("base:1.1"),
        }
    }
}

/// Selects the framing for a session.
///
/// base:1.1 is chosen only when both peers advertise it.
pub fn negotiate_base(client: &Capabilities, server: &Capabilities) -> BaseVersion {
    if client.contains(BASE_1_1) && server.contains(BASE_1_1) {
        BaseVersion::V1_1
    } else {
        BaseVersion::V1_0
    }
}

/// Raised when an operation needs a capability the server did not advertise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server does not support [{0}]")]
pub struct MissingCapability(pub String);

/// A single capability URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Creates a capability from a URI, trimming surrounding whitespace.
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let trimmed = uri.trim();
        if trimmed.len() == uri.len() {
            Self(uri)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Returns the full URI, including any query string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the URI without its `?query` part.
    pub fn base_uri(&self) -> &str {
        match self.0.split_once('?') {
            Some((base, _)) => base,
            None => &self.0,
        }
    }

    /// Returns the shorthand names this capability answers to.
    ///
    /// `urn:ietf:params:netconf:capability:candidate:1.0` yields
    /// `:candidate` and `:candidate:1.0`.
    pub fn abbreviations(&self) -> Vec<String> {
        let base = self.base_uri();
        let rest = if let Some(rest) = base.strip_prefix(CAPABILITY_PREFIX) {
            rest.to_string()
        } else if let Some(version) = base.strip_prefix(BASE_PREFIX) {
            format!("base:{version}")
        } else {
            return Vec::new();
        };

        let mut names = vec![format!(":{rest}")];
        if let Some((name, _version)) = rest.rsplit_once(':') {
            names.push(format!(":{name}"));
        }
        names
    }

    /// Returns true if `name` is this URI or one of its shorthands.
    pub fn matches(&self, name: &str) -> bool {
        if self.0 == name || self.base_uri() == name {
            return true;
        }
        name.starts_with(':') && self.abbreviations().iter().any(|abbr| abbr == name)
    }

    /// Returns the YANG module advertised via `?module=`, if any.
    pub fn module(&self) -> Option<&str> {
        self.query_param("module")
    }

    /// Returns the YANG module revision advertised via `&revision=`, if any.
    pub fn revision(&self) -> Option<&str> {
        self.query_param("revision")
    }

    fn query_param(&self, key: &str) -> Option<&str> {
        let (_, query) = self.0.split_once('?')?;
        query
            .split(['&', ';'])
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for Capability {
    fn from(uri: String) -> Self {
        Self::new(uri)
    }
}

/// An immutable, ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities {
    caps: Vec<Capability>,
}

impl Capabilities {
    /// Builds a set from URIs, dropping blanks and duplicates while keeping
    /// advertisement order.
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Capability>,
    {
        let mut caps: Vec<Capability> = Vec::new();
        for cap in uris.into_iter().map(Into::into) {
            if !cap.as_str().is_empty() && !caps.contains(&cap) {
                caps.push(cap);
            }
        }
        Self { caps }
    }

    /// The set this client advertises by default.
    pub fn default_client() -> Self {
        Self::new(DEFAULT_CLIENT_CAPABILITIES.iter().copied())
    }

    /// Returns true if any capability matches `name` (URI or shorthand).
    pub fn contains(&self, name: &str) -> bool {
        self.caps.iter().any(|cap| cap.matches(name))
    }

    /// Fails with [`MissingCapability`] unless `name` is present.
    pub fn require(&self, name: &str) -> Result<(), MissingCapability> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(MissingCapability(name.to_string()))
        }
    }

    /// Iterates capabilities in advertisement order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.iter()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.caps.len()
    }

    /// Returns true if no capability was advertised.
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// Lists advertised YANG modules as `(module, revision)`.
    pub fn modules(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.caps
            .iter()
            .filter_map(|cap| cap.module().map(|m| (m, cap.revision())))
    }

    pub fn supports_base_1_1(&self) -> bool {
        self.contains(BASE_1_1)
    }

    pub fn supports_candidate(&self) -> bool {
        self.contains(":candidate")
    }

    pub fn supports_confirmed_commit(&self) -> bool {
        self.contains(":confirmed-commit")
    }

    pub fn supports_validate(&self) -> bool {
        self.contains(":validate")
    }

    pub fn supports_url(&self) -> bool {
        self.contains(":url")
    }

    pub fn supports_startup(&self) -> bool {
        self.contains(":startup")
    }

    pub fn supports_writable_running(&self) -> bool {
        self.contains(":writable-running")
    }

    pub fn supports_rollback_on_error(&self) -> bool {
        self.contains(":rollback-on-error")
    }

    pub fn supports_notifications(&self) -> bool {
        self.contains(":notification")
    }

    pub fn supports_xpath(&self) -> bool {
        self.contains(":xpath")
    }
}

impl<'a> IntoIterator for &'a Capabilities {
    type Item = &'a Capability;
    type IntoIter = std::slice::Iter<'a, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.caps.iter()
    }
}

impl<S: Into<Capability>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(uris: &[&str]) -> Capabilities {
        Capabilities::new(uris.iter().copied())
    }

    #[test]
    fn exact_and_shorthand_lookup() {
        let set = caps(&[
            BASE_1_0,
            "urn:ietf:params:netconf:capability:candidate:1.0",
            "urn:ietf:params:netconf:capability:confirmed-commit:1.1",
        ]);

        assert!(set.contains(BASE_1_0));
        assert!(set.contains(":base:1.0"));
        assert!(set.contains(":candidate"));
        assert!(set.contains(":candidate:1.0"));
        assert!(set.contains(":confirmed-commit"));
        assert!(!set.contains(":confirmed-commit:1.0"));
        assert!(!set.contains(":validate"));
        assert!(!set.contains("candidate"));
    }

    #[test]
    fn query_string_ignored_for_matching() {
        let set = caps(&["urn:ietf:params:netconf:capability:url:1.0?scheme=file,ftp"]);
        assert!(set.supports_url());
        assert!(set.contains("urn:ietf:params:netconf:capability:url:1.0"));
    }

    #[test]
    fn yang_module_parameters() {
        let cap = Capability::new(
            "urn:ietf:params:xml:ns:yang:ietf-interfaces?module=ietf-interfaces&revision=2018-02-20",
        );
        assert_eq!(cap.module(), Some("ietf-interfaces"));
        assert_eq!(cap.revision(), Some("2018-02-20"));
        assert!(cap.abbreviations().is_empty());

        let set = Capabilities::new([cap]);
        let modules: Vec<_> = set.modules().collect();
        assert_eq!(modules, vec![("ietf-interfaces", Some("2018-02-20"))]);
    }

    #[test]
    fn duplicates_and_blanks_dropped() {
        let set = caps(&[BASE_1_0, "  ", BASE_1_0, " urn:x:y "]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().nth(1).unwrap().as_str(), "urn:x:y");
    }

    #[test]
    fn require_reports_missing_name() {
        let set = caps(&[BASE_1_0]);
        assert!(set.require(":base:1.0").is_ok());
        let err = set.require(":candidate").unwrap_err();
        assert_eq!(err, MissingCapability(":candidate".into()));
        assert_eq!(err.to_string(), "server does not support [:candidate]");
    }

    #[test]
    fn negotiation_matrix() {
        let with = caps(&[BASE_1_0, BASE_1_1]);
        let without = caps(&[BASE_1_0]);

        assert_eq!(negotiate_base(&with, &with), BaseVersion::V1_1);
        assert_eq!(negotiate_base(&with, &without), BaseVersion::V1_0);
        assert_eq!(negotiate_base(&without, &with), BaseVersion::V1_0);
        assert_eq!(negotiate_base(&without, &without), BaseVersion::V1_0);
    }

    #[test]
    fn default_client_set() {
        let set = Capabilities::default_client();
        assert!(set.supports_base_1_1());
        assert!(set.contains(BASE_1_0));
        assert!(set.supports_notifications());
    }

    #[test]
    fn serializes_as_uri_list() {
        let set = caps(&[BASE_1_0, BASE_1_1]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, format!("[\"{BASE_1_0}\",\"{BASE_1_1}\"]"));
    }
}
