//! Builders for the standard NETCONF operations.
//!
//! Each builder checks the server's capabilities first and fails before
//! anything is sent. The returned markup is the bare operation; pass it to
//! [`Session::dispatch`](crate::Session::dispatch) or
//! [`Session::request`](crate::Session::request) to wrap it in an `<rpc>`.

use std::fmt;
use std::str::FromStr;

use netconf_core::Capabilities;
use netconf_protocol::{
    NETCONF_MONITORING_NS, NETCONF_NOTIFICATION_NS, compact_xml, parse_document,
};
use quick_xml::escape::escape;

use crate::error::{NetconfError, NetconfResult};

/// A configuration datastore or URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datastore {
    Running,
    Candidate,
    Startup,
    Url(String),
}

impl Datastore {
    fn require(&self, capabilities: &Capabilities) -> NetconfResult<()> {
        match self {
            Self::Running => Ok(()),
            Self::Candidate => Ok(capabilities.require(":candidate")?),
            Self::Startup => Ok(capabilities.require(":startup")?),
            Self::Url(_) => Ok(capabilities.require(":url")?),
        }
    }

    fn to_xml(&self) -> String {
        match self {
            Self::Running => "<running/>".to_string(),
            Self::Candidate => "<candidate/>".to_string(),
            Self::Startup => "<startup/>".to_string(),
            Self::Url(url) => format!("<url>{}</url>", escape(url.as_str())),
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Candidate => f.write_str("candidate"),
            Self::Startup => f.write_str("startup"),
            Self::Url(url) => f.write_str(url),
        }
    }
}

impl FromStr for Datastore {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "running" => Ok(Self::Running),
            "candidate" => Ok(Self::Candidate),
            "startup" => Ok(Self::Startup),
            url if url.contains("://") => Ok(Self::Url(url.to_string())),
            other => Err(NetconfError::invalid_operation(format!(
                "unknown datastore {other:?}"
            ))),
        }
    }
}

/// Selection filter for `<get>`, `<get-config>` and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Subtree filter content, or a complete `<filter>` element.
    Subtree(String),
    /// XPath expression; needs `:xpath`.
    XPath(String),
}

impl Filter {
    fn to_xml(&self, capabilities: &Capabilities) -> NetconfResult<String> {
        match self {
            Self::Subtree(content) => {
                let content = compact_xml(content)?;
                let root = parse_document(&content)?;
                if root.local_name() == "filter" {
                    Ok(content)
                } else {
                    Ok(format!(r#"<filter type="subtree">{content}</filter>"#))
                }
            }
            Self::XPath(select) => {
                capabilities.require(":xpath")?;
                Ok(format!(
                    r#"<filter type="xpath" select="{}"/>"#,
                    escape(select.as_str())
                ))
            }
        }
    }
}

fn filter_xml(filter: Option<&Filter>, capabilities: &Capabilities) -> NetconfResult<String> {
    filter.map_or_else(|| Ok(String::new()), |f| f.to_xml(capabilities))
}

/// `<get>`.
pub fn get(capabilities: &Capabilities, filter: Option<&Filter>) -> NetconfResult<String> {
    Ok(format!("<get>{}</get>", filter_xml(filter, capabilities)?))
}

/// `<get-config>`.
pub fn get_config(
    capabilities: &Capabilities,
    source: &Datastore,
    filter: Option<&Filter>,
) -> NetconfResult<String> {
    source.require(capabilities)?;
    Ok(format!(
        "<get-config><source>{}</source>{}</get-config>",
        source.to_xml(),
        filter_xml(filter, capabilities)?
    ))
}

/// `<lock>`.
pub fn lock(capabilities: &Capabilities, target: &Datastore) -> NetconfResult<String> {
    target.require(capabilities)?;
    Ok(format!("<lock><target>{}</target></lock>", target.to_xml()))
}

/// `<unlock>`.
pub fn unlock(capabilities: &Capabilities, target: &Datastore) -> NetconfResult<String> {
    target.require(capabilities)?;
    Ok(format!("<unlock><target>{}</target></unlock>", target.to_xml()))
}

/// Parameters of `<commit>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Request a confirmed commit.
    pub confirmed: bool,
    /// Seconds before an unconfirmed commit is rolled back.
    pub confirm_timeout: Option<u32>,
    /// Token that lets another session confirm this commit.
    pub persist: Option<String>,
    /// Confirms a persistent confirmed commit.
    pub persist_id: Option<String>,
}

/// `<commit>`.
pub fn commit(capabilities: &Capabilities, options: &CommitOptions) -> NetconfResult<String> {
    capabilities.require(":candidate")?;
    if options.persist.is_some() && options.persist_id.is_some() {
        return Err(NetconfError::invalid_operation(
            "persist and persist-id cannot be combined",
        ));
    }
    if !options.confirmed && (options.confirm_timeout.is_some() || options.persist.is_some()) {
        return Err(NetconfError::invalid_operation(
            "confirm-timeout and persist require a confirmed commit",
        ));
    }
    if options.confirmed || options.persist_id.is_some() {
        capabilities.require(":confirmed-commit")?;
    }

    let mut body = String::new();
    if options.confirmed {
        body.push_str("<confirmed/>");
    }
    if let Some(timeout) = options.confirm_timeout {
        body.push_str(&format!("<confirm-timeout>{timeout}</confirm-timeout>"));
    }
    if let Some(persist) = &options.persist {
        body.push_str(&format!("<persist>{}</persist>", escape(persist.as_str())));
    }
    if let Some(persist_id) = &options.persist_id {
        body.push_str(&format!(
            "<persist-id>{}</persist-id>",
            escape(persist_id.as_str())
        ));
    }

    if body.is_empty() {
        Ok("<commit/>".to_string())
    } else {
        Ok(format!("<commit>{body}</commit>"))
    }
}

/// `<cancel-commit>`.
pub fn cancel_commit(
    capabilities: &Capabilities,
    persist_id: Option<&str>,
) -> NetconfResult<String> {
    capabilities.require(":candidate")?;
    capabilities.require(":confirmed-commit")?;
    Ok(match persist_id {
        Some(id) => format!(
            "<cancel-commit><persist-id>{}</persist-id></cancel-commit>",
            escape(id)
        ),
        None => "<cancel-commit/>".to_string(),
    })
}

/// `<discard-changes>`.
pub fn discard_changes(capabilities: &Capabilities) -> NetconfResult<String> {
    capabilities.require(":candidate")?;
    Ok("<discard-changes/>".to_string())
}

/// `<validate>`.
pub fn validate(capabilities: &Capabilities, source: &Datastore) -> NetconfResult<String> {
    capabilities.require(":validate")?;
    source.require(capabilities)?;
    Ok(format!(
        "<validate><source>{}</source></validate>",
        source.to_xml()
    ))
}

/// `<copy-config>`.
pub fn copy_config(
    capabilities: &Capabilities,
    source: &Datastore,
    target: &Datastore,
) -> NetconfResult<String> {
    if source == target {
        return Err(NetconfError::invalid_operation(format!(
            "source and target are both {source}"
        )));
    }
    source.require(capabilities)?;
    target.require(capabilities)?;
    Ok(format!(
        "<copy-config><target>{}</target><source>{}</source></copy-config>",
        target.to_xml(),
        source.to_xml()
    ))
}

/// `<delete-config>`.
pub fn delete_config(capabilities: &Capabilities, target: &Datastore) -> NetconfResult<String> {
    if *target == Datastore::Running {
        return Err(NetconfError::invalid_operation(
            "the running datastore cannot be deleted",
        ));
    }
    target.require(capabilities)?;
    Ok(format!(
        "<delete-config><target>{}</target></delete-config>",
        target.to_xml()
    ))
}

/// `<get-schema>` from ietf-netconf-monitoring.
pub fn get_schema(
    capabilities: &Capabilities,
    identifier: &str,
    version: Option<&str>,
    format: Option<&str>,
) -> NetconfResult<String> {
    let monitored = capabilities.iter().any(|cap| {
        cap.base_uri() == NETCONF_MONITORING_NS || cap.module() == Some("ietf-netconf-monitoring")
    });
    if !monitored {
        return Err(netconf_core::MissingCapability(NETCONF_MONITORING_NS.to_string()).into());
    }

    let mut body = format!("<identifier>{}</identifier>", escape(identifier));
    if let Some(version) = version {
        body.push_str(&format!("<version>{}</version>", escape(version)));
    }
    if let Some(format) = format {
        body.push_str(&format!("<format>{}</format>", escape(format)));
    }
    Ok(format!(
        r#"<get-schema xmlns="{NETCONF_MONITORING_NS}">{body}</get-schema>"#
    ))
}

/// `<create-subscription>` (RFC 5277).
pub fn create_subscription(
    capabilities: &Capabilities,
    stream: Option<&str>,
    filter: Option<&Filter>,
    start_time: Option<&str>,
    stop_time: Option<&str>,
) -> NetconfResult<String> {
    capabilities.require(":notification")?;
    if stop_time.is_some() && start_time.is_none() {
        return Err(NetconfError::invalid_operation(
            "stop-time requires a start-time",
        ));
    }

    let mut body = String::new();
    if let Some(stream) = stream {
        body.push_str(&format!("<stream>{}</stream>", escape(stream)));
    }
    body.push_str(&filter_xml(filter, capabilities)?);
    if let Some(start) = start_time {
        body.push_str(&format!("<startTime>{}</startTime>", escape(start)));
    }
    if let Some(stop) = stop_time {
        body.push_str(&format!("<stopTime>{}</stopTime>", escape(stop)));
    }
    Ok(format!(
        r#"<create-subscription xmlns="{NETCONF_NOTIFICATION_NS}">{body}</create-subscription>"#
    ))
}

/// `<close-session>`.
pub fn close_session() -> String {
    "<close-session/>".to_string()
}

/// `<kill-session>`.
pub fn kill_session(session_id: u32) -> String {
    format!("<kill-session><session-id>{session_id}</session-id></kill-session>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use netconf_core::BASE_1_0;

    fn full() -> Capabilities {
        Capabilities::new([
            BASE_1_0,
            "urn:ietf:params:netconf:capability:candidate:1.0",
            "urn:ietf:params:netconf:capability:confirmed-commit:1.1",
            "urn:ietf:params:netconf:capability:validate:1.1",
            "urn:ietf:params:netconf:capability:startup:1.0",
            "urn:ietf:params:netconf:capability:url:1.0?scheme=file",
            "urn:ietf:params:netconf:capability:xpath:1.0",
            "urn:ietf:params:netconf:capability:notification:1.0",
            "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring?module=ietf-netconf-monitoring&revision=2010-10-04",
        ])
    }

    fn bare() -> Capabilities {
        Capabilities::new([BASE_1_0])
    }

    fn is_missing(result: NetconfResult<String>, name: &str) -> bool {
        matches!(result, Err(NetconfError::MissingCapability(ref missing)) if missing.0 == name)
    }

    #[test]
    fn get_config_with_subtree_filter() {
        let filter = Filter::Subtree("<interfaces xmlns=\"urn:ietf:params:xml:ns:yang:ietf-interfaces\">\n  <interface/>\n</interfaces>".into());
        let xml = get_config(&bare(), &Datastore::Running, Some(&filter)).unwrap();
        insta::assert_snapshot!(xml, @r#"<get-config><source><running/></source><filter type="subtree"><interfaces xmlns="urn:ietf:params:xml:ns:yang:ietf-interfaces"><interface/></interfaces></filter></get-config>"#);
    }

    #[test]
    fn complete_filter_element_is_kept() {
        let filter = Filter::Subtree(r#"<filter type="subtree"><system/></filter>"#.into());
        assert_eq!(
            get(&bare(), Some(&filter)).unwrap(),
            r#"<get><filter type="subtree"><system/></filter></get>"#
        );
    }

    #[test]
    fn xpath_filter_needs_capability() {
        let filter = Filter::XPath("/interfaces/interface[name='eth0']".into());
        assert!(is_missing(get(&bare(), Some(&filter)), ":xpath"));
        assert_eq!(
            get(&full(), Some(&filter)).unwrap(),
            r#"<get><filter type="xpath" select="/interfaces/interface[name=&apos;eth0&apos;]"/></get>"#
        );
    }

    #[test]
    fn datastores_need_capabilities() {
        assert!(is_missing(lock(&bare(), &Datastore::Candidate), ":candidate"));
        assert!(is_missing(get_config(&bare(), &Datastore::Startup, None), ":startup"));
        assert!(is_missing(
            delete_config(&bare(), &Datastore::Url("file:///tmp/x.xml".into())),
            ":url"
        ));
        assert_eq!(
            unlock(&full(), &Datastore::Candidate).unwrap(),
            "<unlock><target><candidate/></target></unlock>"
        );
    }

    #[test]
    fn commit_variants() {
        assert!(is_missing(commit(&bare(), &CommitOptions::default()), ":candidate"));
        assert_eq!(commit(&full(), &CommitOptions::default()).unwrap(), "<commit/>");

        let confirmed = CommitOptions {
            confirmed: true,
            confirm_timeout: Some(120),
            persist: Some("abc".into()),
            persist_id: None,
        };
        insta::assert_snapshot!(commit(&full(), &confirmed).unwrap(), @"<commit><confirmed/><confirm-timeout>120</confirm-timeout><persist>abc</persist></commit>");

        let confirm_only_candidate =
            Capabilities::new(["urn:ietf:params:netconf:capability:candidate:1.0"]);
        assert!(is_missing(
            commit(&confirm_only_candidate, &confirmed),
            ":confirmed-commit"
        ));
    }

    #[test]
    fn commit_rejects_persist_with_persist_id() {
        let options = CommitOptions {
            confirmed: true,
            persist: Some("a".into()),
            persist_id: Some("b".into()),
            ..Default::default()
        };
        assert!(matches!(
            commit(&full(), &options),
            Err(NetconfError::InvalidOperation(_))
        ));

        let unconfirmed_timeout = CommitOptions {
            confirm_timeout: Some(10),
            ..Default::default()
        };
        assert!(commit(&full(), &unconfirmed_timeout).is_err());
    }

    #[test]
    fn cancel_commit_and_discard() {
        assert_eq!(
            cancel_commit(&full(), Some("abc")).unwrap(),
            "<cancel-commit><persist-id>abc</persist-id></cancel-commit>"
        );
        assert!(cancel_commit(&bare(), None).is_err());
        assert!(is_missing(discard_changes(&bare()), ":candidate"));
    }

    #[test]
    fn validate_and_copy() {
        assert!(is_missing(validate(&bare(), &Datastore::Running), ":validate"));
        assert_eq!(
            validate(&full(), &Datastore::Candidate).unwrap(),
            "<validate><source><candidate/></source></validate>"
        );
        assert_eq!(
            copy_config(&full(), &Datastore::Running, &Datastore::Startup).unwrap(),
            "<copy-config><target><startup/></target><source><running/></source></copy-config>"
        );
        assert!(copy_config(&full(), &Datastore::Running, &Datastore::Running).is_err());
        assert!(delete_config(&full(), &Datastore::Running).is_err());
    }

    #[test]
    fn schema_and_subscription() {
        assert!(get_schema(&bare(), "ietf-interfaces", None, None).is_err());
        assert_eq!(
            get_schema(&full(), "ietf-interfaces", Some("2018-02-20"), Some("yang")).unwrap(),
            r#"<get-schema xmlns="urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring"><identifier>ietf-interfaces</identifier><version>2018-02-20</version><format>yang</format></get-schema>"#
        );

        assert!(is_missing(
            create_subscription(&bare(), None, None, None, None),
            ":notification"
        ));
        let stop_only =
            create_subscription(&full(), None, None, None, Some("2024-01-01T00:00:00Z"));
        assert!(stop_only.is_err());
        assert_eq!(
            create_subscription(&full(), Some("NETCONF"), None, None, None).unwrap(),
            r#"<create-subscription xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><stream>NETCONF</stream></create-subscription>"#
        );
    }

    #[test]
    fn datastore_parsing() {
        assert_eq!("candidate".parse::<Datastore>().unwrap(), Datastore::Candidate);
        assert_eq!(
            "file:///tmp/cfg.xml".parse::<Datastore>().unwrap(),
            Datastore::Url("file:///tmp/cfg.xml".into())
        );
        assert!("nope".parse::<Datastore>().is_err());
    }

    #[test]
    fn session_operations() {
        assert_eq!(close_session(), "<close-session/>");
        assert_eq!(
            kill_session(17),
            "<kill-session><session-id>17</session-id></kill-session>"
        );
    }
}
