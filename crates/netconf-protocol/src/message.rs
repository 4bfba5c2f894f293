//! NETCONF message construction and typed views over parsed documents.

use std::fmt;

use chrono::{DateTime, Utc};
use netconf_core::Capabilities;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;

use crate::error::{ProtocolError, ProtocolResult};
use crate::xml::{Element, compact_xml, parse_document};
use crate::{NETCONF_BASE_NS, NETCONF_NOTIFICATION_NS};

/// An `xmlns` or `xmlns:prefix` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceDecl {
    pub prefix: Option<String>,
    pub uri: String,
}

impl NamespaceDecl {
    /// Default namespace declaration (`xmlns="uri"`).
    pub fn default_namespace(uri: impl Into<String>) -> Self {
        Self {
            prefix: None,
            uri: uri.into(),
        }
    }

    /// Prefixed declaration (`xmlns:prefix="uri"`).
    pub fn prefixed(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            uri: uri.into(),
        }
    }

    fn attribute_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        }
    }
}

fn push_namespaces(start: &mut BytesStart<'_>, namespaces: &[NamespaceDecl]) {
    if !namespaces.iter().any(|ns| ns.prefix.is_none()) {
        start.push_attribute(("xmlns", NETCONF_BASE_NS));
    }
    for ns in namespaces {
        let name = ns.attribute_name();
        start.push_attribute((name.as_str(), ns.uri.as_str()));
    }
}

/// Serializes a `<hello>` advertising `capabilities`.
///
/// The base namespace is the default namespace unless `namespaces`
/// declares another one.
pub fn build_hello(
    capabilities: &Capabilities,
    namespaces: &[NamespaceDecl],
) -> ProtocolResult<String> {
    let mut writer = Writer::new(Vec::new());

    let mut hello = BytesStart::new("hello");
    push_namespaces(&mut hello, namespaces);
    writer.write_event(Event::Start(hello))?;
    writer.write_event(Event::Start(BytesStart::new("capabilities")))?;
    for capability in capabilities.iter() {
        writer.write_event(Event::Start(BytesStart::new("capability")))?;
        writer.write_event(Event::Text(BytesText::new(capability.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new("capability")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("capabilities")))?;
    writer.write_event(Event::End(BytesEnd::new("hello")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// A peer's `<hello>`.
#[derive(Debug, Clone)]
pub struct Hello {
    /// Only servers send a session-id.
    pub session_id: Option<u32>,
    pub capabilities: Capabilities,
}

impl Hello {
    /// Reads a hello from its root element.
    ///
    /// Both namespaced and unqualified tags are accepted since some
    /// devices omit the base namespace.
    pub fn parse(root: &Element) -> ProtocolResult<Self> {
        if !is_base(root, "hello") {
            return Err(ProtocolError::MalformedMessage(format!(
                "expected <hello>, got <{}>",
                root.name()
            )));
        }

        let session_id = match root.child("session-id") {
            Some(element) => Some(element.text().parse::<u32>().map_err(|_| {
                ProtocolError::MalformedMessage(format!(
                    "invalid session-id {:?}",
                    element.text()
                ))
            })?),
            None => None,
        };

        let capabilities = root
            .child("capabilities")
            .map(|caps| {
                caps.children_named("capability")
                    .map(|c| c.text().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Capabilities>()
            })
            .unwrap_or_default();

        Ok(Self {
            session_id,
            capabilities,
        })
    }

    /// Parses a raw hello document.
    pub fn from_xml(raw: &str) -> ProtocolResult<Self> {
        Self::parse(&parse_document(raw)?)
    }
}

fn is_base(element: &Element, local: &str) -> bool {
    element.local_name() == local
        && element
            .namespace()
            .is_none_or(|namespace| namespace == NETCONF_BASE_NS)
}

/// The operation part of a user supplied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Local name of the operation element, e.g. `get-config`.
    pub name: String,
    /// Compacted operation markup.
    pub body: String,
    /// Namespaces declared on a stripped `<rpc>` wrapper.
    pub namespaces: Vec<NamespaceDecl>,
}

/// Normalizes a request before it is wrapped in an `<rpc>` envelope.
///
/// Whitespace-only text nodes are removed. A request that is already an
/// `<rpc>` is unwrapped to its single operation, keeping the wrapper's
/// namespace declarations so prefixed content stays resolvable.
pub fn extract_operation(raw: &str) -> ProtocolResult<Operation> {
    let compact = compact_xml(raw)?;
    let root = parse_document(&compact)?;

    if !is_base(&root, "rpc") {
        return Ok(Operation {
            name: root.local_name().to_string(),
            body: root.outer_xml(&compact).to_string(),
            namespaces: Vec::new(),
        });
    }

    let operation = match root.children() {
        [operation] => operation,
        [] => return Err(ProtocolError::MissingElement("operation".into())),
        _ => {
            return Err(ProtocolError::MalformedMessage(
                "<rpc> must contain exactly one operation".into(),
            ));
        }
    };

    let namespaces = root
        .namespace_decls()
        .iter()
        .filter(|ns| !(ns.prefix.is_none() && ns.uri == NETCONF_BASE_NS))
        .cloned()
        .collect();

    Ok(Operation {
        name: operation.local_name().to_string(),
        body: operation.outer_xml(&compact).to_string(),
        namespaces,
    })
}

/// Wraps an operation in an `<rpc>` envelope carrying `message_id`.
pub fn build_rpc(
    message_id: &str,
    operation: &str,
    namespaces: &[NamespaceDecl],
) -> ProtocolResult<String> {
    if operation.trim().is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }

    let mut writer = Writer::new(Vec::new());
    let mut rpc = BytesStart::new("rpc");
    push_namespaces(&mut rpc, namespaces);
    rpc.push_attribute(("message-id", message_id));
    writer.write_event(Event::Start(rpc))?;
    writer.write_event(Event::Text(BytesText::from_escaped(operation)))?;
    writer.write_event(Event::End(BytesEnd::new("rpc")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Finds the message-id on the root element or one of its immediate children.
pub fn message_id_of(root: &Element) -> Option<&str> {
    root.attribute("message-id").or_else(|| {
        root.children()
            .iter()
            .find_map(|child| child.attribute("message-id"))
    })
}

/// True when the document is an RFC 5277 `<notification>`.
pub fn is_notification(root: &Element) -> bool {
    root.is(NETCONF_NOTIFICATION_NS, "notification")
}

/// A single `<rpc-error>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub error_type: Option<String>,
    pub tag: Option<String>,
    pub app_tag: Option<String>,
    pub severity: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    /// Verbatim `<error-info>` content.
    pub info: Option<String>,
}

impl RpcError {
    fn parse(element: &Element, raw: &str) -> Self {
        let owned = |local: &str| element.child_text(local).map(str::to_string);
        Self {
            error_type: owned("error-type"),
            tag: owned("error-tag"),
            app_tag: owned("error-app-tag"),
            severity: owned("error-severity"),
            path: owned("error-path"),
            message: owned("error-message"),
            info: element
                .child("error-info")
                .map(|info| info.inner_xml(raw).trim().to_string())
                .filter(|info| !info.is_empty()),
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity.as_deref() == Some("warning")
    }

    /// Present fields as `(label, value)` pairs for display.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("type", &self.error_type),
            ("tag", &self.tag),
            ("app-tag", &self.app_tag),
            ("severity", &self.severity),
            ("path", &self.path),
            ("message", &self.message),
            ("info", &self.info),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_deref().map(|v| (label, v)))
        .collect()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag.as_deref().unwrap_or("unknown-error");
        match &self.message {
            Some(message) => write!(f, "{tag}: {message}"),
            None => f.write_str(tag),
        }
    }
}

impl std::error::Error for RpcError {}

/// A parsed `<rpc-reply>`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcReply {
    pub message_id: Option<String>,
    /// `<ok/>` was present.
    pub ok: bool,
    /// Verbatim `<data>` content.
    pub data: Option<String>,
    pub errors: Vec<RpcError>,
    /// The whole reply as received.
    pub raw: String,
}

impl RpcReply {
    pub fn parse(root: &Element, raw: &str) -> ProtocolResult<Self> {
        if !is_base(root, "rpc-reply") {
            return Err(ProtocolError::MalformedMessage(format!(
                "expected <rpc-reply>, got <{}>",
                root.name()
            )));
        }

        Ok(Self {
            message_id: root.attribute("message-id").map(str::to_string),
            ok: root.child("ok").is_some(),
            data: root.child("data").map(|data| data.inner_xml(raw).to_string()),
            errors: root
                .children_named("rpc-error")
                .map(|error| RpcError::parse(error, raw))
                .collect(),
            raw: raw.to_string(),
        })
    }

    pub fn from_xml(raw: &str) -> ProtocolResult<Self> {
        Self::parse(&parse_document(raw)?, raw)
    }

    /// First error that is not a warning.
    pub fn error(&self) -> Option<&RpcError> {
        self.errors.iter().find(|error| !error.is_warning())
    }

    pub fn is_ok(&self) -> bool {
        self.error().is_none()
    }

    /// Turns an error reply into `Err`.
    pub fn into_result(self) -> Result<Self, RpcError> {
        match self.error() {
            Some(error) => Err(error.clone()),
            None => Ok(self),
        }
    }
}

/// A received event notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    raw: String,
    event_time: Option<String>,
    name: Option<String>,
    received_at: DateTime<Utc>,
}

impl Notification {
    pub fn parse(root: &Element, raw: &str) -> ProtocolResult<Self> {
        if !is_notification(root) {
            return Err(ProtocolError::MalformedMessage(format!(
                "expected notification, got <{}>",
                root.name()
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            event_time: root.child_text("eventTime").map(str::to_string),
            name: root
                .children()
                .iter()
                .find(|child| child.local_name() != "eventTime")
                .map(|child| child.local_name().to_string()),
            received_at: Utc::now(),
        })
    }

    /// The notification document as received.
    pub fn xml(&self) -> &str {
        &self.raw
    }

    /// `<eventTime>` as sent by the server.
    pub fn event_time(&self) -> Option<&str> {
        self.event_time.as_deref()
    }

    /// Local name of the event element.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}
