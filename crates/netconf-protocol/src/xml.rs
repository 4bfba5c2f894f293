//! Minimal XML document model for incoming NETCONF messages.
//!
//! Every received document is parsed once into an [`Element`] tree that
//! keeps byte offsets into the raw text, so consumers can cut out verbatim
//! fragments such as the content of `<data>`.

use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::{Reader, Writer};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::NamespaceDecl;

/// Namespace-resolved element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Namespace URI, if the element is in one.
    pub namespace: Option<String>,
    /// Local part of the name.
    pub local: String,
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// An element of a parsed document.
#[derive(Debug, Clone)]
pub struct Element {
    name: QualifiedName,
    attributes: Vec<(String, String)>,
    namespaces: Vec<NamespaceDecl>,
    children: Vec<Element>,
    text: String,
    outer: Range<usize>,
    inner: Range<usize>,
}

impl Element {
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace.as_deref()
    }

    /// Returns true for `{namespace}local`.
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local_name() == local && self.namespace() == Some(namespace)
    }

    /// Attribute value by local name.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == local)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// `xmlns` declarations made on this element.
    pub fn namespace_decls(&self) -> &[NamespaceDecl] {
        &self.namespaces
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == local)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.local_name() == local)
    }

    /// Concatenated direct text content, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text of a child element, if present and not blank.
    pub fn child_text(&self, local: &str) -> Option<&str> {
        self.child(local)
            .map(Element::text)
            .filter(|text| !text.is_empty())
    }

    /// Verbatim markup between the start and end tags.
    ///
    /// `raw` must be the document this element was parsed from.
    pub fn inner_xml<'a>(&self, raw: &'a str) -> &'a str {
        raw.get(self.inner.clone()).unwrap_or_default()
    }

    /// Verbatim markup of the element itself.
    pub fn outer_xml<'a>(&self, raw: &'a str) -> &'a str {
        raw.get(self.outer.clone()).unwrap_or_default()
    }
}

/// Parses a complete document, enforcing well-formedness.
pub fn parse_document(raw: &str) -> ProtocolResult<Element> {
    let mut reader = NsReader::from_str(raw);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let before = position(&reader);
        let (resolved, event) = reader.read_resolved_event()?;
        let namespace = namespace_of(resolved);
        let after = position(&reader);

        match event {
            Event::Start(start) => {
                ensure_single_root(&stack, &root)?;
                stack.push(open_element(namespace, &start, before..after)?);
            }
            Event::Empty(start) => {
                ensure_single_root(&stack, &root)?;
                let mut element = open_element(namespace, &start, before..after)?;
                element.inner = after..after;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let mut element = stack.pop().ok_or_else(|| {
                    ProtocolError::MalformedMessage("unexpected end tag".into())
                })?;
                element.inner.end = before;
                element.outer.end = after;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(cdata) => {
                let text = String::from_utf8(cdata.into_inner().into_owned())?;
                push_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ProtocolError::MalformedMessage(format!(
            "unclosed element <{}>",
            open.local_name()
        )));
    }
    root.ok_or(ProtocolError::EmptyMessage)
}

/// Re-indents a document for display.
///
/// Returns the input unchanged when it is not well-formed.
pub fn pretty_xml(raw: &str) -> String {
    reindent(raw).unwrap_or_else(|_| raw.to_string())
}

fn reindent(raw: &str) -> ProtocolResult<String> {
    parse_document(raw)?;

    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Drops whitespace-only text nodes, keeping everything else verbatim.
///
/// NETCONF servers may treat indentation inside leaf elements as content.
pub fn compact_xml(raw: &str) -> ProtocolResult<String> {
    parse_document(raw)?;

    let mut reader = Reader::from_str(raw);
    let mut writer = Writer::new(Vec::new());
    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => {}
            event => writer.write_event(event)?,
        }
    }
    Ok(String::from_utf8(writer.into_inner())?)
}

fn position<R>(reader: &NsReader<R>) -> usize {
    reader.buffer_position() as usize
}

fn namespace_of(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.0).into_owned()),
        ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
    }
}

fn ensure_single_root(stack: &[Element], root: &Option<Element>) -> ProtocolResult<()> {
    if stack.is_empty() && root.is_some() {
        return Err(ProtocolError::MalformedMessage(
            "multiple root elements".into(),
        ));
    }
    Ok(())
}

fn open_element(
    namespace: Option<String>,
    start: &BytesStart<'_>,
    span: Range<usize>,
) -> ProtocolResult<Element> {
    let local = String::from_utf8(start.local_name().as_ref().to_vec())?;

    let mut attributes = Vec::new();
    let mut namespaces = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        if let Some(binding) = attr.key.as_namespace_binding() {
            let prefix = match binding {
                quick_xml::name::PrefixDeclaration::Default => None,
                quick_xml::name::PrefixDeclaration::Named(prefix) => {
                    Some(String::from_utf8(prefix.to_vec())?)
                }
            };
            namespaces.push(NamespaceDecl { prefix, uri: value });
            continue;
        }
        let key = String::from_utf8(attr.key.local_name().as_ref().to_vec())?;
        attributes.push((key, value));
    }

    Ok(Element {
        name: QualifiedName { namespace, local },
        attributes,
        namespaces,
        children: Vec::new(),
        text: String::new(),
        inner: span.end..span.end,
        outer: span,
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [Element], text: &str) -> ProtocolResult<()> {
    match stack.last_mut() {
        Some(element) => element.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => {
            return Err(ProtocolError::MalformedMessage(
                "text outside the root element".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" xmlns:if="urn:example:if" message-id="7">
  <data>
    <if:interfaces><if:name>eth0 &amp; more</if:name></if:interfaces>
  </data>
</rpc-reply>"#;

    #[test]
    fn resolves_names_and_attributes() {
        let root = parse_document(REPLY).unwrap();
        assert!(root.is(crate::NETCONF_BASE_NS, "rpc-reply"));
        assert_eq!(root.attribute("message-id"), Some("7"));
        assert_eq!(root.attributes().len(), 1);
        assert_eq!(root.namespace_decls().len(), 2);

        let data = root.child("data").unwrap();
        let interfaces = &data.children()[0];
        assert!(interfaces.is("urn:example:if", "interfaces"));
        assert_eq!(interfaces.child_text("name"), Some("eth0 & more"));
    }

    #[test]
    fn inner_and_outer_spans() {
        let root = parse_document(REPLY).unwrap();
        let data = root.child("data").unwrap();
        assert_eq!(
            data.inner_xml(REPLY).trim(),
            "<if:interfaces><if:name>eth0 &amp; more</if:name></if:interfaces>"
        );
        assert!(data.outer_xml(REPLY).starts_with("<data>"));
        assert!(data.outer_xml(REPLY).ends_with("</data>"));
    }

    #[test]
    fn empty_element_spans() {
        let raw = "<a><ok/></a>";
        let root = parse_document(raw).unwrap();
        let ok = root.child("ok").unwrap();
        assert_eq!(ok.outer_xml(raw), "<ok/>");
        assert_eq!(ok.inner_xml(raw), "");
        assert_eq!(root.inner_xml(raw), "<ok/>");
    }

    #[test]
    fn rejects_malformed_documents() {
        for bad in ["<a><b></a>", "<a>", "<a/><b/>", "text<a/>", "", "<a></a></b>"] {
            assert!(parse_document(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn cdata_is_text() {
        let root = parse_document("<a><![CDATA[<x>]]></a>").unwrap();
        assert_eq!(root.text(), "<x>");
    }

    #[test]
    fn pretty_print_indents() {
        let pretty = pretty_xml("<a><b>1</b><c/></a>");
        assert_eq!(pretty, "<a>\n  <b>1</b>\n  <c/>\n</a>");
    }

    #[test]
    fn pretty_print_returns_invalid_input_unchanged() {
        assert_eq!(pretty_xml("<a><b></a>"), "<a><b></a>");
    }

    #[test]
    fn compact_drops_whitespace_only_text() {
        let compact = compact_xml("<a>\n  <b> keep </b>\n  <c>\n  </c>\n</a>").unwrap();
        assert_eq!(compact, "<a><b> keep </b><c></c></a>");
    }
}
