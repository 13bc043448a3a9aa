//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur while invoking a UPnP action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoapError {
    /// Connection, timeout or unexpected HTTP status
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The response was not a well-formed SOAP envelope
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// SOAP fault carrying the UPnP error code (500 when the device omits it)
    #[error("SOAP fault: error code {0}")]
    Fault(u16),
}
