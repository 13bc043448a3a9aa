//! Error types for DIDL-Lite parsing

use thiserror::Error;

/// Errors that can occur while reading a DIDL-Lite document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The XML itself is malformed
    #[error("XML parsing failed at byte {position}: {message}")]
    Xml { position: usize, message: String },

    /// Well-formed XML that is not a DIDL-Lite document
    #[error("Invalid DIDL-Lite structure: {0}")]
    InvalidStructure(String),

    /// The document ended before every element was closed
    #[error("Unexpected end of document inside <{0}>")]
    UnexpectedEof(String),
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;
