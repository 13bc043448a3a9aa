//! The content source a host browses
//!
//! [`ContentSource`] owns everything a browse needs: the action invoker, the
//! DIDL-Lite parser, the metadata compiler, the configuration and the browse
//! id counter. Sessions live in a map keyed by [`BrowseId`] from the moment
//! the browse starts until the moment it terminates.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::ControlFlow;
use std::time::Duration;

use cds_didl::DidlParser;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::KeySet;
use crate::config::SourceConfig;
use crate::error::{CdsError, Result};
use crate::filter::{self, FilterNode};
use crate::identity;
use crate::metadata::{Metadata, MetadataCompiler};
use crate::session::{BrowseSession, CompiledBrowse};
use crate::sort::SortSpec;
use crate::transport::{ActionHandle, ActionInvoker, ActionRequest, ActionResponse, BrowseFlag};

/// Identifies one browse of a [`ContentSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BrowseId(pub u32);

impl fmt::Display for BrowseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to browse and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseRequest {
    pub object_id: String,
    /// Turns the browse into a Search of the container
    pub filter: Option<FilterNode>,
    pub sort: Option<SortSpec>,
    pub keys: KeySet,
    pub skip_count: u32,
    /// 0 means every item
    pub item_count: u32,
}

impl BrowseRequest {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            filter: None,
            sort: None,
            keys: KeySet::new(),
            skip_count: 0,
            item_count: 0,
        }
    }

    pub fn filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sort by a host criteria string such as `+title,-album`.
    ///
    /// Malformed criteria are dropped rather than sent, since some servers
    /// fail every request carrying sort input they do not understand.
    pub fn sort_criteria(mut self, criteria: &str) -> Self {
        self.sort = match SortSpec::parse(criteria) {
            Ok(sort) => Some(sort),
            Err(e) => {
                warn!(criteria, error = %e, "ignoring sort criteria");
                None
            }
        };
        self
    }

    pub fn keys(mut self, keys: KeySet) -> Self {
        self.keys = keys;
        self
    }

    pub fn key_names<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keys(KeySet::from_names(names))
    }

    pub fn skip(mut self, skip_count: u32) -> Self {
        self.skip_count = skip_count;
        self
    }

    pub fn count(mut self, item_count: u32) -> Self {
        self.item_count = item_count;
        self
    }
}

/// One callback of a browse.
///
/// Item events carry an object id and metadata. The event with `remaining`
/// 0 is the last one the browse produces; it is either the last item or a
/// terminator without an object, possibly carrying the error that ended the
/// browse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEvent {
    pub browse_id: BrowseId,
    pub remaining: u32,
    pub index: u32,
    pub object_id: Option<String>,
    pub metadata: Option<Metadata>,
    pub error: Option<CdsError>,
}

impl BrowseEvent {
    pub fn is_last(&self) -> bool {
        self.remaining == 0
    }
}

/// Result of [`ContentSource::get_metadata`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataResult {
    pub object_id: String,
    pub metadata: Metadata,
}

type BrowseCallback = Box<dyn FnMut(BrowseEvent) -> ControlFlow<()>>;
type MetadataCallback = Box<dyn FnOnce(Result<MetadataResult>)>;

struct ActiveBrowse {
    session: BrowseSession,
    callback: BrowseCallback,
}

struct PendingMetadata {
    object_id: String,
    keys: KeySet,
    callback: MetadataCallback,
}

enum InFlight {
    Page(BrowseId),
    Metadata(PendingMetadata),
}

/// How a browse ends
enum Ending {
    /// The last item already told the host
    Quiet,
    /// Emit a terminator, with the error if the browse failed
    Terminator(Option<CdsError>),
}

/// A browsable, searchable ContentDirectory service.
///
/// All methods run on the host's thread. Actions are started through the
/// invoker and finish when their outcome is passed to
/// [`complete_action`](Self::complete_action), usually via
/// [`dispatch_completions`](Self::dispatch_completions).
pub struct ContentSource<I> {
    uuid: String,
    invoker: I,
    config: SourceConfig,
    parser: DidlParser,
    compiler: MetadataCompiler,
    next_browse_id: u32,
    browses: BTreeMap<BrowseId, ActiveBrowse>,
    in_flight: HashMap<ActionHandle, InFlight>,
}

impl<I: ActionInvoker> ContentSource<I> {
    pub fn new(uuid: impl Into<String>, invoker: I, config: SourceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            uuid: uuid.into(),
            invoker,
            compiler: MetadataCompiler::new(config.transport_protocol.clone()),
            config,
            parser: DidlParser::new(),
            next_browse_id: 1,
            browses: BTreeMap::new(),
            in_flight: HashMap::new(),
        })
    }

    /// Source for the device with the given UDN
    pub fn for_device(udn: &str, invoker: I, config: SourceConfig) -> Result<Self> {
        Self::new(identity::udn_to_uuid(udn), invoker, config)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn invoker_mut(&mut self) -> &mut I {
        &mut self.invoker
    }

    /// Whether `id` names a browse that has not terminated
    pub fn is_browsing(&self, id: BrowseId) -> bool {
        self.browses.contains_key(&id)
    }

    pub fn active_browses(&self) -> usize {
        self.browses.len()
    }

    /// Start browsing the children of a container, or searching it when the
    /// request has a filter.
    ///
    /// Filter and object id problems are reported here and no action is
    /// started. Everything after that arrives through `callback`, which can
    /// return `ControlFlow::Break` to cancel the browse.
    pub fn browse<F>(&mut self, request: BrowseRequest, callback: F) -> Result<BrowseId>
    where
        F: FnMut(BrowseEvent) -> ControlFlow<()> + 'static,
    {
        let (_, item_id) = identity::decode(&request.object_id)?;
        let search_criteria = request.filter.as_ref().map(filter::compile).transpose()?;

        let compiled = CompiledBrowse {
            container_id: identity::remote_item_id(item_id).to_string(),
            search_criteria,
            sort_criteria: request
                .sort
                .as_ref()
                .map(SortSpec::to_criteria)
                .unwrap_or_default(),
            result_filter: request.keys.filter_string(),
            keys: request.keys,
            skip_count: request.skip_count,
            item_count: request.item_count,
        };

        let id = self.allocate_browse_id();

        info!(
            browse_id = %id,
            object_id = %request.object_id,
            filter = %compiled.result_filter,
            sort = %compiled.sort_criteria,
            search = compiled.search_criteria.as_deref().unwrap_or(""),
            "starting browse"
        );

        // Registered before the first page starts, so a completion for it
        // always finds its session
        self.browses.insert(
            id,
            ActiveBrowse {
                session: BrowseSession::new(id, compiled),
                callback: Box::new(callback),
            },
        );

        if let Err(e) = self.request_page(id) {
            warn!(browse_id = %id, error = %e, "unable to start browse");
            self.browses.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Stop a browse. The browse's callback receives one terminator and
    /// nothing after it.
    pub fn cancel_browse(&mut self, id: BrowseId) -> Result<()> {
        if !self.browses.contains_key(&id) {
            warn!(browse_id = %id, "unable to cancel unknown browse");
            return Err(CdsError::InvalidBrowseId(id));
        }
        info!(browse_id = %id, "cancelling browse");
        self.end_browse(id, Ending::Terminator(None));
        Ok(())
    }

    /// Fetch metadata of a single object.
    ///
    /// Unknown key names are ignored. When no known key remains the callback
    /// runs immediately with empty metadata and nothing is sent to the
    /// server. The `didl` key yields the raw document the server returned.
    pub fn get_metadata<S, F>(&mut self, object_id: &str, key_names: &[S], callback: F) -> Result<()>
    where
        S: AsRef<str>,
        F: FnOnce(Result<MetadataResult>) + 'static,
    {
        let (_, item_id) = identity::decode(object_id)?;
        let keys = KeySet::from_names(key_names);
        if keys.is_empty() {
            callback(Ok(MetadataResult {
                object_id: object_id.to_string(),
                metadata: Metadata::new(),
            }));
            return Ok(());
        }

        let request = ActionRequest::Browse {
            object_id: identity::remote_item_id(item_id).to_string(),
            flag: BrowseFlag::Metadata,
            filter: keys.filter_string(),
            starting_index: 0,
            requested_count: 0,
            sort_criteria: String::new(),
        };
        debug!(object_id, filter = %keys.filter_string(), "requesting metadata");

        let handle = self.invoker.begin_action(request)?;
        self.in_flight.insert(
            handle,
            InFlight::Metadata(PendingMetadata {
                object_id: object_id.to_string(),
                keys,
                callback: Box::new(callback),
            }),
        );
        Ok(())
    }

    /// Object ids of the containers named by a `ContainerUpdateIDs` value
    pub fn changed_containers(&self, container_update_ids: &str) -> Vec<String> {
        identity::container_update_object_ids(&self.uuid, container_update_ids)
    }

    /// Wait up to `timeout` for one completion, then handle every completion
    /// already queued. Returns how many were handled.
    pub fn dispatch_completions(&mut self, timeout: Duration) -> usize {
        let mut handled = 0;
        let mut wait = timeout;
        while let Some(completion) = self.invoker.next_completion(wait) {
            self.complete_action(completion.handle, completion.outcome);
            handled += 1;
            wait = Duration::ZERO;
        }
        handled
    }

    /// Hand the outcome of a finished action to the browse or metadata
    /// request that started it. Unknown handles are ignored.
    pub fn complete_action(&mut self, handle: ActionHandle, outcome: Result<ActionResponse>) {
        match self.in_flight.remove(&handle) {
            Some(InFlight::Page(id)) => self.page_completed(id, handle, outcome),
            Some(InFlight::Metadata(pending)) => self.metadata_completed(pending, outcome),
            None => debug!(%handle, "ignoring completion of unknown action"),
        }
    }

    /// Next free browse id. Ids wrap around, skip 0 and never reuse one
    /// that is still live.
    fn allocate_browse_id(&mut self) -> BrowseId {
        loop {
            let id = BrowseId(self.next_browse_id);
            self.next_browse_id = self.next_browse_id.wrapping_add(1).max(1);
            if !self.browses.contains_key(&id) {
                return id;
            }
        }
    }

    /// Start the session's next page. `Ok(false)` means there is nothing left
    /// to request.
    fn request_page(&mut self, id: BrowseId) -> Result<bool> {
        let Some(active) = self.browses.get_mut(&id) else {
            return Ok(false);
        };
        let Some(request) = active.session.next_request(self.config.page_size) else {
            return Ok(false);
        };

        debug!(
            browse_id = %id,
            action = request.action(),
            starting_index = request.starting_index(),
            requested_count = request.requested_count(),
            "requesting page"
        );

        let handle = self.invoker.begin_action(request)?;
        active.session.page_requested(handle);
        self.in_flight.insert(handle, InFlight::Page(id));
        Ok(true)
    }

    fn page_completed(&mut self, id: BrowseId, handle: ActionHandle, outcome: Result<ActionResponse>) {
        let Some(active) = self.browses.get_mut(&id) else {
            debug!(browse_id = %id, "dropping page of finished browse");
            return;
        };
        if !active.session.page_completed(handle) {
            debug!(browse_id = %id, %handle, "dropping stale page");
            return;
        }

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(browse_id = %id, error = %e, "browse action failed");
                self.end_browse(id, Ending::Terminator(Some(e)));
                return;
            }
        };
        debug!(
            browse_id = %id,
            number_returned = response.number_returned,
            total_matches = response.total_matches,
            "page received"
        );

        let document = match response.result {
            Some(document) if response.total_matches > 0 => document,
            _ => {
                self.end_browse(id, Ending::Terminator(None));
                return;
            }
        };
        if active.session.page_received(response.total_matches) == 0 {
            self.end_browse(id, Ending::Terminator(None));
            return;
        }

        let uuid = &self.uuid;
        let compiler = &self.compiler;
        let mut delivered = 0u32;
        let mut stopped = false;
        let parsed = self.parser.parse(&document, |item| {
            if stopped {
                return;
            }
            // Objects without an id, such as vendor <desc> blocks, are not counted
            let Some(item_id) = item.id.as_deref() else {
                return;
            };
            let Some(slot) = active.session.next_item() else {
                return;
            };
            delivered += 1;

            let event = BrowseEvent {
                browse_id: id,
                remaining: slot.remaining,
                index: slot.index,
                object_id: Some(identity::encode(uuid, item_id)),
                metadata: Some(compiler.compile(active.session.keys(), &item, None)),
                error: None,
            };
            if (active.callback)(event).is_break() {
                stopped = true;
            }
        });
        let exhausted = active.session.is_exhausted();

        if exhausted {
            self.end_browse(id, Ending::Quiet);
        } else if stopped {
            info!(browse_id = %id, "browse stopped by callback");
            self.end_browse(id, Ending::Terminator(None));
        } else if let Err(e) = parsed {
            warn!(browse_id = %id, error = %e, "unable to parse browse result");
            self.end_browse(id, Ending::Terminator(Some(e.into())));
        } else if delivered == 0 {
            self.end_browse(id, Ending::Terminator(None));
        } else {
            match self.request_page(id) {
                Ok(true) => {}
                Ok(false) => self.end_browse(id, Ending::Quiet),
                Err(e) => {
                    warn!(browse_id = %id, error = %e, "unable to request next page");
                    self.end_browse(id, Ending::Terminator(Some(e)));
                }
            }
        }
    }

    /// Terminate a browse and drop it from the session map
    fn end_browse(&mut self, id: BrowseId, ending: Ending) {
        let Some(mut active) = self.browses.remove(&id) else {
            return;
        };
        let (terminated, pending) = active.session.terminate();
        if !terminated {
            return;
        }
        if let Some(handle) = pending {
            self.in_flight.remove(&handle);
            self.invoker.cancel_action(handle);
        }

        debug!(browse_id = %id, emitted = active.session.emitted(), "browse finished");

        if let Ending::Terminator(error) = ending {
            // The host is not listening anymore, so its answer does not matter
            let _ = (active.callback)(BrowseEvent {
                browse_id: id,
                remaining: 0,
                index: active.session.current_index(),
                object_id: None,
                metadata: None,
                error,
            });
        }
    }

    fn metadata_completed(&mut self, pending: PendingMetadata, outcome: Result<ActionResponse>) {
        let PendingMetadata {
            object_id,
            keys,
            callback,
        } = pending;

        let result = outcome.and_then(|response| {
            let document = response.result.ok_or_else(|| {
                CdsError::ResultParseFailed(format!("no metadata returned for {}", object_id))
            })?;

            let mut found = None;
            self.parser.parse(&document, |item| {
                if found.is_some() {
                    return;
                }
                if let Some(item_id) = item.id.as_deref() {
                    found = Some(MetadataResult {
                        object_id: identity::encode(&self.uuid, item_id),
                        metadata: self.compiler.compile(&keys, &item, Some(&document)),
                    });
                }
            })?;
            found.ok_or_else(|| {
                CdsError::ResultParseFailed(format!("no object in metadata of {}", object_id))
            })
        });

        if let Err(e) = &result {
            warn!(object_id = %object_id, error = %e, "metadata request failed");
        }
        callback(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Completion;

    #[test]
    fn test_browse_id_display() {
        assert_eq!(BrowseId(42).to_string(), "42");
    }

    #[test]
    fn test_request_builder() {
        let request = BrowseRequest::new("_src::7")
            .key_names(["title", "bogus"])
            .sort_criteria("+title")
            .skip(3)
            .count(10);
        assert_eq!(request.keys.len(), 1);
        assert_eq!(request.sort.as_ref().map(SortSpec::to_criteria).as_deref(), Some("+dc:title"));
        assert_eq!((request.skip_count, request.item_count), (3, 10));
    }

    #[test]
    fn test_malformed_sort_is_dropped() {
        let request = BrowseRequest::new("_src::7").sort_criteria("title");
        assert!(request.sort.is_none());
    }

    /// Accepts every action and never completes one
    #[derive(Default)]
    struct SilentInvoker {
        next: u64,
    }

    impl ActionInvoker for SilentInvoker {
        fn begin_action(&mut self, _request: ActionRequest) -> Result<ActionHandle> {
            self.next += 1;
            Ok(ActionHandle(self.next))
        }

        fn cancel_action(&mut self, _handle: ActionHandle) {}

        fn next_completion(&mut self, _timeout: Duration) -> Option<Completion> {
            None
        }
    }

    #[test]
    fn test_browse_ids_skip_live_sessions_after_wrapping() {
        fn start(source: &mut ContentSource<SilentInvoker>) -> BrowseId {
            source
                .browse(BrowseRequest::new("_src::"), |_| ControlFlow::Continue(()))
                .unwrap()
        }

        let mut source =
            ContentSource::new("_src", SilentInvoker::default(), SourceConfig::default()).unwrap();

        assert_eq!(start(&mut source), BrowseId(1));
        source.next_browse_id = u32::MAX;
        assert_eq!(start(&mut source), BrowseId(u32::MAX));
        assert_eq!(start(&mut source), BrowseId(2));
        assert_eq!(source.active_browses(), 3);
    }

    #[test]
    fn test_event_is_last() {
        let event = BrowseEvent {
            browse_id: BrowseId(1),
            remaining: 0,
            index: 4,
            object_id: None,
            metadata: None,
            error: None,
        };
        assert!(event.is_last());
    }
}
