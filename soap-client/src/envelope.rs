//! SOAP 1.1 envelope construction and action response decoding.
//!
//! Decoding is deliberately strict. A device's fault response must never be
//! mistaken for a successful action result, so anything that is not exactly an
//! `Envelope` holding one `Body` holding one `<Action>Response` is rejected.

use xmltree::{Element, XMLNode};

use crate::error::{SoapError, UpnpFault};

/// Namespace of the SOAP 1.1 envelope.
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Encoding style declared on every request envelope.
pub const SOAP_ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Error code reported when a fault carries no `UPnPError/errorCode`.
const DEFAULT_FAULT_CODE: u16 = 500;

/// Escape text for embedding as XML element content or attribute value.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Build the request envelope for `action` on `service_type`.
///
/// Arguments are written in the order given, which callers are expected to
/// have aligned with the action's declared parameter order. Values are escaped
/// here and must be passed in unescaped.
pub fn build_action_request<K, V>(action: &str, service_type: &str, args: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut message = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="{SOAP_ENVELOPE_NS}" s:encodingStyle="{SOAP_ENCODING_STYLE}"><s:Body><u:{action} xmlns:u="{service_type}">"#,
        service_type = escape_xml(service_type),
    );
    for (name, value) in args {
        let name = name.as_ref();
        message.push('<');
        message.push_str(name);
        message.push('>');
        message.push_str(&escape_xml(value.as_ref()));
        message.push_str("</");
        message.push_str(name);
        message.push('>');
    }
    message.push_str(&format!("</u:{action}></s:Body></s:Envelope>"));
    message
}

/// Decoded `<Action>Response` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Action the response belongs to
    pub action: String,
    /// Output arguments in document order
    pub values: Vec<(String, String)>,
    /// The undecoded response body
    pub raw_body: String,
}

impl ActionResponse {
    /// Value of the named output argument.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a response body for `action`.
pub fn parse_action_response(xml_text: &str, action: &str) -> Result<ActionResponse, SoapError> {
    let root = Element::parse(xml_text.as_bytes())
        .map_err(|e| SoapError::Parse(format!("Invalid XML in {action} response: {e}")))?;
    decode_action_response(&root, action, xml_text)
}

/// Classify an already parsed response tree.
///
/// Returns the payload for a well-formed `<action>Response`, a
/// [`SoapError::Fault`] when the body carries a fault, and
/// [`SoapError::Parse`] for every other shape.
pub fn decode_action_response(
    root: &Element,
    action: &str,
    raw_body: &str,
) -> Result<ActionResponse, SoapError> {
    if !root.name.contains("Envelope") {
        return Err(SoapError::Parse(format!(
            "Root element <{}> is not a SOAP Envelope",
            root.name
        )));
    }

    let body = single_child(root)
        .filter(|element| element.name.contains("Body"))
        .ok_or_else(|| SoapError::Parse("Envelope must contain exactly one Body".to_string()))?;

    if let Some(fault) = child_elements(body).find(|element| element.name.contains("Fault")) {
        return Err(SoapError::Fault(Box::new(decode_fault(fault, raw_body))));
    }

    let payload = single_child(body)
        .ok_or_else(|| SoapError::Parse("Body must contain exactly one element".to_string()))?;

    let expected = format!("{action}Response");
    if payload.name != expected {
        return Err(SoapError::Parse(format!(
            "Expected <{}>, found <{}>",
            expected, payload.name
        )));
    }

    let values = child_elements(payload)
        .map(|element| (element.name.clone(), element_text(element)))
        .collect();

    Ok(ActionResponse {
        action: action.to_string(),
        values,
        raw_body: raw_body.to_string(),
    })
}

fn decode_fault(fault: &Element, raw_body: &str) -> UpnpFault {
    let upnp_error = child_named(fault, "detail").and_then(|detail| child_named(detail, "UPnPError"));

    let error_code = upnp_error
        .and_then(|error| child_named(error, "errorCode"))
        .and_then(|code| element_text(code).trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_FAULT_CODE);

    UpnpFault {
        fault_code: child_named(fault, "faultcode")
            .map(element_text)
            .unwrap_or_default(),
        fault_string: child_named(fault, "faultstring")
            .map(element_text)
            .unwrap_or_default(),
        error_code,
        error_description: upnp_error
            .and_then(|error| child_named(error, "errorDescription"))
            .map(element_text),
        raw_body: raw_body.to_string(),
    }
}

/// Element children, skipping text, comments and processing instructions.
pub(crate) fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

fn single_child(element: &Element) -> Option<&Element> {
    let mut children = child_elements(element);
    match (children.next(), children.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn child_named<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    child_elements(element).find(|child| child.name.eq_ignore_ascii_case(name))
}

pub(crate) fn element_text(element: &Element) -> String {
    element
        .get_text()
        .map(|text| text.into_owned())
        .unwrap_or_default()
}
