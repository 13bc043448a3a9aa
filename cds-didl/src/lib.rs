//! # cds-didl
//!
//! Parsing for the DIDL-Lite documents a UPnP ContentDirectory service returns
//! from `Browse` and `Search`.
//!
//! The parser is event driven: every `<item>` and `<container>` is handed to a
//! callback as soon as its end tag is read, in document order.
//!
//! ```rust
//! use cds_didl::DidlParser;
//!
//! let xml = r#"<DIDL-Lite><item id="1" parentID="0"><dc:title>Song</dc:title></item></DIDL-Lite>"#;
//! let mut titles = Vec::new();
//! let count = DidlParser::new()
//!     .parse(xml, |item| titles.push(item.title().unwrap_or_default().to_string()))
//!     .unwrap();
//! assert_eq!(count, 1);
//! assert_eq!(titles, vec!["Song".to_string()]);
//! ```

pub mod error;
pub mod object;
pub mod parser;
pub mod protocol_info;
pub mod values;

pub use error::{ParseError, ParseResult};
pub use object::{ContentItem, ObjectKind, Property, Resource};
pub use parser::DidlParser;
pub use protocol_info::{DlnaOperation, ProtocolInfo};
pub use values::{parse_duration, parse_resolution};
