use cds_didl::ParseError;
use soap_client::SoapError;
use thiserror::Error;

use crate::source::BrowseId;

/// Errors surfaced by the content source
///
/// Filter and object-id errors are returned synchronously, before any action
/// is sent to the server. Transport and parse errors end a browse session and
/// are delivered through its terminal callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdsError {
    /// The filter could not be expressed as UPnP search criteria
    #[error("Invalid search string: {0}")]
    InvalidSearchString(String),

    /// The Browse or Search action failed or could not be sent
    #[error("Transport action failed: {0}")]
    TransportActionFailed(String),

    /// The server answered but its result could not be read
    #[error("Result parsing failed: {0}")]
    ResultParseFailed(String),

    /// The object id is not of the form `<uuid>::<item id>`
    #[error("Invalid object id: {0}")]
    InvalidObjectId(String),

    /// No active browse session has this id
    #[error("Invalid browse id: {0}")]
    InvalidBrowseId(BrowseId),

    /// Configuration values that cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Type alias for results that can return a CdsError
pub type Result<T> = std::result::Result<T, CdsError>;

impl From<SoapError> for CdsError {
    fn from(error: SoapError) -> Self {
        match error {
            SoapError::Network(msg) => CdsError::TransportActionFailed(msg),
            SoapError::Fault(code) => {
                CdsError::TransportActionFailed(format!("UPnP error code {}", code))
            }
            SoapError::Parse(msg) => CdsError::ResultParseFailed(msg),
        }
    }
}

impl From<ParseError> for CdsError {
    fn from(error: ParseError) -> Self {
        CdsError::ResultParseFailed(error.to_string())
    }
}
