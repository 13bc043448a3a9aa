//! Private SOAP client for UPnP control actions
//!
//! This crate provides the minimal SOAP plumbing the ContentDirectory source
//! needs: build an action envelope, post it to a control URL and hand back the
//! `<ActionResponse>` element, or the UPnP error code of a SOAP fault.

mod error;

pub use error::SoapError;

use std::time::Duration;
use tracing::debug;
use xmltree::Element;

/// A minimal blocking SOAP client for UPnP control points
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    /// Create a new SOAP client with default timeouts (5s connect, 10s read)
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(10))
    }

    /// Create a SOAP client with explicit connect and read timeouts
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Invoke `action` on the service at `control_url` and return the parsed
    /// `<{action}Response>` element.
    ///
    /// Argument values are XML-escaped; names are written as given.
    pub fn call(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, String)],
    ) -> Result<Element, SoapError> {
        let body = build_envelope(service_type, action, args);
        let soap_action = format!("\"{}#{}\"", service_type, action);

        debug!(control_url, action, "sending SOAP request");

        let response = match self
            .agent
            .post(control_url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action)
            .send_string(&body)
        {
            Ok(response) => response,
            // UPnP devices report action errors as HTTP 500 with a SOAP fault body
            Err(ureq::Error::Status(status, response)) => {
                let xml_text = response
                    .into_string()
                    .map_err(|e| SoapError::Network(e.to_string()))?;
                let fault = Element::parse(xml_text.as_bytes())
                    .ok()
                    .and_then(|xml| fault_code(&xml));
                return Err(match fault {
                    Some(code) => SoapError::Fault(code),
                    None => SoapError::Network(format!("HTTP status {}", status)),
                });
            }
            Err(e) => return Err(SoapError::Network(e.to_string())),
        };

        let xml_text = response
            .into_string()
            .map_err(|e| SoapError::Network(e.to_string()))?;

        let xml = Element::parse(xml_text.as_bytes())
            .map_err(|e| SoapError::Parse(e.to_string()))?;

        self.extract_response(&xml, action)
    }

    fn extract_response(&self, xml: &Element, action: &str) -> Result<Element, SoapError> {
        let body = xml
            .get_child("Body")
            .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

        if let Some(code) = fault_code(xml) {
            return Err(SoapError::Fault(code));
        }

        let response_name = format!("{}Response", action);
        body.get_child(response_name.as_str())
            .cloned()
            .ok_or_else(|| SoapError::Parse(format!("Missing {} element", response_name)))
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// UPnP error code of a SOAP fault envelope, 500 when the fault carries none
fn fault_code(xml: &Element) -> Option<u16> {
    let fault = xml.get_child("Body")?.get_child("Fault")?;
    let code = fault
        .get_child("detail")
        .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")))
        .and_then(|e| e.get_child("errorCode"))
        .and_then(|c| c.get_text())
        .and_then(|t| t.trim().parse::<u16>().ok())
        .unwrap_or(500);
    Some(code)
}

fn build_envelope(service_type: &str, action: &str, args: &[(&str, String)]) -> String {
    let payload: String = args
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", escape_xml(value)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service_type}">{payload}</u:{action}></s:Body></s:Envelope>"#
    )
}

/// Escape the five XML special characters for use in element text
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
