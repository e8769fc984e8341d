//! SOAP envelopes for the Polarion web services.
//!
//! Requests are written with `quick_xml::Writer`, so every value is
//! escaped; responses are read into a small [`XmlElement`] tree keyed by
//! local names.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::domain::errors::{AlmError, AlmResult};

/// SOAP 1.1 envelope namespace.
pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// A Polarion web service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// `SessionWebService`: log in and out.
    Session,
    /// `TrackerWebService`: work items.
    Tracker,
    /// `ProjectWebService`: projects.
    Project,
}

impl Service {
    /// Endpoint path below the server URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Session => "/polarion/ws/services/SessionWebService",
            Self::Tracker => "/polarion/ws/services/TrackerWebService",
            Self::Project => "/polarion/ws/services/ProjectWebService",
        }
    }

    /// Namespace prefix used in requests.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Session => "ses",
            Self::Tracker => "trac",
            Self::Project => "proj",
        }
    }

    /// Operation namespace.
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Session => "http://ws.polarion.com/SessionWebService-impl",
            Self::Tracker => "http://ws.polarion.com/TrackerWebService-impl",
            Self::Project => "http://ws.polarion.com/ProjectWebService-impl",
        }
    }
}

/// A request argument: a text element or an element with children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `<name>text</name>`.
    Text(String, String),
    /// `<name>children...</name>`.
    Parent(String, Vec<Node>),
}

impl Node {
    /// Text element.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text(name.into(), text.into())
    }

    /// Element with children.
    pub fn parent(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self::Parent(name.into(), children)
    }

    /// `<name><id>value</id></name>`, the shape of enum references.
    pub fn enum_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self::parent(name, vec![Self::text("id", id)])
    }
}

fn xml_err(err: impl std::fmt::Display) -> AlmError {
    AlmError::Protocol(format!("failed to write SOAP request: {err}"))
}

fn write_node(writer: &mut Writer<Cursor<Vec<u8>>>, prefix: &str, node: &Node) -> AlmResult<()> {
    match node {
        Node::Text(name, text) => {
            let tag = format!("{prefix}:{name}");
            writer
                .write_event(Event::Start(BytesStart::new(tag.as_str())))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(tag.as_str())))
                .map_err(xml_err)?;
        }
        Node::Parent(name, children) => {
            let tag = format!("{prefix}:{name}");
            writer
                .write_event(Event::Start(BytesStart::new(tag.as_str())))
                .map_err(xml_err)?;
            for child in children {
                write_node(writer, prefix, child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(tag.as_str())))
                .map_err(xml_err)?;
        }
    }
    Ok(())
}

/// Serialize a SOAP request for `service.operation(args)`.
///
/// When `session` is set it is sent as the `ses:sessionID` header.
pub fn build_envelope(
    service: Service,
    operation: &str,
    session: Option<&str>,
    args: &[Node],
) -> AlmResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut envelope = BytesStart::new("soapenv:Envelope");
    envelope.push_attribute(("xmlns:soapenv", ENVELOPE_NS));
    envelope.push_attribute(("xmlns:ses", Service::Session.namespace()));
    if service != Service::Session {
        envelope.push_attribute((
            format!("xmlns:{}", service.prefix()).as_str(),
            service.namespace(),
        ));
    }
    writer
        .write_event(Event::Start(envelope))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("soapenv:Header")))
        .map_err(xml_err)?;
    if let Some(token) = session {
        write_node(&mut writer, "ses", &Node::text("sessionID", token))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Header")))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("soapenv:Body")))
        .map_err(xml_err)?;
    write_node(
        &mut writer,
        service.prefix(),
        &Node::parent(operation, args.to_vec()),
    )?;
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Body")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Envelope")))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| AlmError::Protocol(format!("SOAP request is not UTF-8: {e}")))
}

/// A parsed XML element. Names are local (namespace prefixes dropped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name.
    pub name: String,
    /// Attributes by local name.
    pub attributes: Vec<(String, String)>,
    /// Concatenated text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> AlmResult<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child named `name`, if non-empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    /// First element named `name` in a depth-first walk, including self.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// Parse an XML document into its root element.
pub fn parse(xml: &str) -> AlmResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(XmlElement::from_start(&start)?),
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| AlmError::Protocol("empty XML document".to_string()))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// Phrases that mark a fault as a session or credential problem.
const AUTH_FAULT_MARKERS: &[&str] = &[
    "session",
    "not authorized",
    "authentication",
    "not logged",
    "invalid user",
];

/// Parse a SOAP response and return its `Body` element.
///
/// A `Fault` becomes `Authentication` when it mentions the session or
/// credentials and `Protocol` otherwise.
pub fn parse_response(xml: &str) -> AlmResult<XmlElement> {
    let root = parse(xml)?;
    if let Some(fault) = root.find("Fault") {
        let message = fault
            .child_text("faultstring")
            .unwrap_or("unknown SOAP fault")
            .to_string();
        let lower = message.to_lowercase();
        if AUTH_FAULT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Err(AlmError::Authentication(message));
        }
        return Err(AlmError::Protocol(format!("SOAP fault: {message}")));
    }
    root.find("Body")
        .cloned()
        .ok_or_else(|| AlmError::Protocol("SOAP response has no Body".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_escapes_values() {
        let xml = build_envelope(
            Service::Tracker,
            "createWorkItem",
            Some("sess-1"),
            &[
                Node::text("projectId", "MED"),
                Node::parent(
                    "workItem",
                    vec![Node::text("title", "A < B & \"C\""), Node::enum_id("type", "requirement")],
                ),
            ],
        )
        .unwrap();

        assert!(xml.contains(r#"xmlns:trac="http://ws.polarion.com/TrackerWebService-impl""#));
        assert!(xml.contains("<ses:sessionID>sess-1</ses:sessionID>"));
        assert!(xml.contains("<trac:title>A &lt; B &amp; "));
        assert!(xml.contains("<trac:type><trac:id>requirement</trac:id></trac:type>"));

        // The escaped envelope parses back to the original value.
        let body = parse(&xml).unwrap();
        let title = body.find("title").unwrap();
        assert_eq!(title.text, "A < B & \"C\"");
    }

    #[test]
    fn test_injection_attempt_stays_text() {
        let xml = build_envelope(
            Service::Tracker,
            "updateWorkItem",
            None,
            &[Node::text("title", "</trac:title><trac:status>closed</trac:status>")],
        )
        .unwrap();
        let root = parse(&xml).unwrap();
        assert!(root.find("status").is_none());
        assert_eq!(
            root.find("title").unwrap().text,
            "</trac:title><trac:status>closed</trac:status>"
        );
    }

    #[test]
    fn test_login_envelope_has_no_session_header() {
        let xml = build_envelope(
            Service::Session,
            "logIn",
            None,
            &[Node::text("userName", "u"), Node::text("password", "p")],
        )
        .unwrap();
        assert!(!xml.contains("sessionID"));
        assert!(xml.contains("<ses:logIn><ses:userName>u</ses:userName>"));
    }

    #[test]
    fn test_parse_response_body() {
        let xml = r#"<?xml version="1.0"?>
            <soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
              <soapenv:Body>
                <ns1:logInResponse xmlns:ns1="http://ws.polarion.com/SessionWebService-impl">
                  <ns1:logInReturn>abc123</ns1:logInReturn>
                </ns1:logInResponse>
              </soapenv:Body>
            </soapenv:Envelope>"#;
        let body = parse_response(xml).unwrap();
        assert_eq!(body.find("logInReturn").unwrap().text, "abc123");
    }

    #[test]
    fn test_parse_response_faults() {
        let fault = |msg: &str| {
            format!(
                r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
                  <soapenv:Body><soapenv:Fault>
                    <faultcode>soapenv:Server</faultcode>
                    <faultstring>{msg}</faultstring>
                  </soapenv:Fault></soapenv:Body></soapenv:Envelope>"#
            )
        };
        assert!(matches!(
            parse_response(&fault("Session expired")),
            Err(AlmError::Authentication(_))
        ));
        match parse_response(&fault("Work item type not found")) {
            Err(AlmError::Protocol(msg)) => assert!(msg.contains("Work item type not found")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_attributes_and_empty_elements() {
        let root = parse(r#"<a><b uri="x:y" unresolvable="false"/><c>t</c></a>"#).unwrap();
        let b = root.child("b").unwrap();
        assert_eq!(b.attr("uri"), Some("x:y"));
        assert_eq!(root.child_text("c"), Some("t"));
        assert_eq!(root.child_text("b"), None);
    }
}
