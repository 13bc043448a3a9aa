//! # cds-source
//!
//! A browsable, searchable media source backed by a UPnP ContentDirectory
//! service.
//!
//! Hosts browse containers by object id, ask for metadata by key name and
//! filter with LDAP-style expressions. This crate turns those requests into
//! paged `Browse` and `Search` actions, parses the DIDL-Lite results and
//! reports one event per object.
//!
//! ```rust,ignore
//! use std::ops::ControlFlow;
//! use std::time::Duration;
//! use cds_source::{BrowseRequest, ContentSource, ServiceEndpoint, SoapInvoker, SourceConfig};
//!
//! let config = SourceConfig::default();
//! let endpoint = ServiceEndpoint::content_directory("http://192.168.1.20:9000/ContentDirectory/control");
//! let invoker = SoapInvoker::new(endpoint, &config);
//! let mut source = ContentSource::for_device("uuid:4d696e69-444c-164e-9d41-001c42f4a0d1", invoker, config)?;
//!
//! let root = format!("{}::", source.uuid());
//! source.browse(BrowseRequest::new(root).key_names(["title", "mime-type"]), |event| {
//!     println!("{:?} {:?}", event.object_id, event.metadata);
//!     ControlFlow::Continue(())
//! })?;
//!
//! while source.active_browses() > 0 {
//!     source.dispatch_completions(Duration::from_millis(100));
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod logging;
pub mod metadata;
pub mod session;
pub mod soap_invoker;
pub mod sort;
pub mod source;
pub mod transport;

pub use catalog::{KeySet, MetadataKey, ValueType, ALL_KEYS};
pub use config::SourceConfig;
pub use error::{CdsError, Result};
pub use filter::{FilterNode, FilterOp};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use metadata::{Metadata, MetadataCompiler, MetadataValue, MIME_CONTAINER};
pub use session::{BrowseSession, SessionState};
pub use soap_invoker::{ServiceEndpoint, SoapInvoker, CONTENT_DIRECTORY_SERVICE};
pub use sort::SortSpec;
pub use source::{BrowseEvent, BrowseId, BrowseRequest, ContentSource, MetadataResult};
pub use transport::{
    ActionHandle, ActionInvoker, ActionRequest, ActionResponse, BrowseFlag, Completion,
};
