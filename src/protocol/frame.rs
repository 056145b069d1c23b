//! BOSH `<body/>` frames.
//!
//! Outgoing frames are built fresh for every request and never reused.
//! Incoming responses are wrapped in [`ResponseBody`], a thin read-only view
//! over the parsed `<body/>` element.

use std::collections::BTreeMap;

use minidom::Element;

use super::NS_HTTPBIND;
use crate::error::{BoshError, Result};

/// Outgoing `<body/>` wrapper around zero or one stanza
#[derive(Debug, Clone)]
pub struct Frame {
    /// Request id
    rid: u64,
    /// Session id (absent only on the very first init frame)
    sid: Option<String>,
    /// Protocol-specific attributes (`to`, `wait`, `xmpp:restart`, ...)
    attributes: BTreeMap<String, String>,
    /// Wrapped stanza
    payload: Option<Element>,
}

impl Frame {
    /// Create an empty frame
    pub fn new(rid: u64, sid: Option<&str>) -> Self {
        Self {
            rid,
            sid: sid.map(str::to_string),
            attributes: BTreeMap::new(),
            payload: None,
        }
    }

    /// Add an attribute to the body wrapper
    pub fn with_attribute(mut self, name: &str, value: impl ToString) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Add several attributes to the body wrapper
    pub fn with_attributes<'a>(mut self, attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        for (name, value) in attrs {
            self.attributes.insert(name.to_string(), value.to_string());
        }
        self
    }

    /// Wrap a stanza
    pub fn with_payload(mut self, payload: Element) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Request id of this frame
    pub fn rid(&self) -> u64 {
        self.rid
    }

    /// Session id of this frame
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Look up a wrapper attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Wrapped stanza, if any
    pub fn payload(&self) -> Option<&Element> {
        self.payload.as_ref()
    }

    /// Serialize to the wire format.
    ///
    /// The wrapper is written as text so prefixed attributes (`xml:lang`,
    /// `xmlns:xmpp`, `xmpp:restart`) pass through untouched; the payload is
    /// serialized by minidom with its own namespace declaration.
    pub fn to_xml(&self) -> String {
        let mut xml = format!("<body xmlns=\"{NS_HTTPBIND}\" rid=\"{}\"", self.rid);

        if let Some(sid) = &self.sid {
            push_attribute(&mut xml, "sid", sid);
        }
        for (name, value) in &self.attributes {
            push_attribute(&mut xml, name, value);
        }

        match &self.payload {
            Some(payload) => {
                xml.push('>');
                xml.push_str(&String::from(payload));
                xml.push_str("</body>");
            },
            None => xml.push_str("/>"),
        }
        xml
    }
}

fn push_attribute(xml: &mut String, name: &str, value: &str) {
    xml.push(' ');
    xml.push_str(name);
    xml.push_str("=\"");
    for c in value.chars() {
        match c {
            '&' => xml.push_str("&amp;"),
            '<' => xml.push_str("&lt;"),
            '>' => xml.push_str("&gt;"),
            '"' => xml.push_str("&quot;"),
            '\'' => xml.push_str("&apos;"),
            c => xml.push(c),
        }
    }
    xml.push('"');
}

/// Parsed `<body/>` of a connection manager response
#[derive(Debug, Clone)]
pub struct ResponseBody {
    root: Element,
}

impl ResponseBody {
    /// Parse a raw HTTP response body
    pub fn parse(xml: &str) -> Result<Self> {
        let trimmed = xml.trim();
        if trimmed.is_empty() {
            return Err(BoshError::Protocol("empty response".to_string()));
        }

        let root: Element = trimmed.parse()?;
        if root.name() != "body" {
            return Err(BoshError::Protocol(format!(
                "expected <body/>, got <{}/>",
                root.name()
            )));
        }

        Ok(Self { root })
    }

    /// Look up a body attribute
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.root.attr(name)
    }

    /// Session id assigned by the server
    pub fn sid(&self) -> Option<&str> {
        self.attr("sid")
    }

    /// `type="terminate"`
    pub fn is_terminate(&self) -> bool {
        self.attr("type") == Some("terminate")
    }

    /// Terminal binding condition, if the server sent one
    pub fn condition(&self) -> Option<&str> {
        self.attr("condition")
    }

    /// First child element
    pub fn first_child(&self) -> Option<&Element> {
        self.root.children().next()
    }

    /// Direct child elements
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.root.children()
    }

    /// First direct child with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.root.children().find(|c| c.name() == name)
    }

    /// `<stream:features/>` section, if present
    pub fn features(&self) -> Option<&Element> {
        self.child("features")
    }

    /// The whole `<body/>` element
    pub fn element(&self) -> &Element {
        &self.root
    }
}

/// First direct child of `parent` with the given local name
pub(crate) fn child_named<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent.children().find(|c| c.name() == name)
}
