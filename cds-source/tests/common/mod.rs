//! In-memory ContentDirectory for driving sources in tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::Duration;

use cds_source::{
    ActionHandle, ActionInvoker, ActionRequest, ActionResponse, BrowseEvent, CdsError, Completion,
    ContentSource, Result, SourceConfig,
};

pub const UUID: &str = "_uuid_3Atest";

type Responder = Box<dyn FnMut(&ActionRequest) -> Result<ActionResponse>>;

/// Answers every action from a responder and queues the completion until it
/// is collected
pub struct ScriptedInvoker {
    responder: Responder,
    next_handle: u64,
    queue: VecDeque<Completion>,
    pub requests: Vec<ActionRequest>,
    pub cancelled: Vec<ActionHandle>,
    pub fail_begin: bool,
}

impl ScriptedInvoker {
    pub fn new(responder: impl FnMut(&ActionRequest) -> Result<ActionResponse> + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            next_handle: 1,
            queue: VecDeque::new(),
            requests: Vec::new(),
            cancelled: Vec::new(),
            fail_begin: false,
        }
    }

    /// A server holding `total` numbered items that returns at most
    /// `max_page` per request
    pub fn with_items(total: u32, max_page: u32) -> Self {
        Self::new(move |request| Ok(page(request, total, max_page)))
    }

    /// `(starting_index, requested_count)` of every request so far
    pub fn windows(&self) -> Vec<(u32, u32)> {
        self.requests
            .iter()
            .map(|r| (r.starting_index(), r.requested_count()))
            .collect()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl ActionInvoker for ScriptedInvoker {
    fn begin_action(&mut self, request: ActionRequest) -> Result<ActionHandle> {
        if self.fail_begin {
            return Err(CdsError::TransportActionFailed("no route to host".to_string()));
        }
        let handle = ActionHandle(self.next_handle);
        self.next_handle += 1;
        let outcome = (self.responder)(&request);
        self.requests.push(request);
        self.queue.push_back(Completion { handle, outcome });
        Ok(handle)
    }

    fn cancel_action(&mut self, handle: ActionHandle) {
        self.queue.retain(|c| c.handle != handle);
        self.cancelled.push(handle);
    }

    fn next_completion(&mut self, _timeout: Duration) -> Option<Completion> {
        self.queue.pop_front()
    }
}

pub fn didl_item(id: u32) -> String {
    format!(
        r#"<item id="{id}" parentID="0" restricted="1"><dc:title>Track {id}</dc:title><upnp:class>object.item.audioItem.musicTrack</upnp:class><res protocolInfo="http-get:*:audio/mpeg:*" duration="0:03:{sec:02}">http://10.0.0.2/{id}.mp3</res></item>"#,
        id = id,
        sec = id % 60
    )
}

pub fn didl(items: impl IntoIterator<Item = String>) -> String {
    let body: String = items.into_iter().collect();
    format!(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">{}</DIDL-Lite>"#,
        body
    )
}

/// The page a server with `total` items returns for `request`
pub fn page(request: &ActionRequest, total: u32, max_page: u32) -> ActionResponse {
    let start = request.starting_index().min(total);
    let mut count = (total - start).min(max_page);
    if request.requested_count() > 0 {
        count = count.min(request.requested_count());
    }
    ActionResponse {
        result: Some(didl((start..start + count).map(didl_item))),
        number_returned: count,
        total_matches: total,
    }
}

pub fn source(invoker: ScriptedInvoker, page_size: u32) -> ContentSource<ScriptedInvoker> {
    ContentSource::new(UUID, invoker, SourceConfig::new().with_page_size(page_size)).unwrap()
}

pub fn root() -> String {
    format!("{}::", UUID)
}

/// A callback recording every event and continuing
pub fn recorder() -> (
    Rc<RefCell<Vec<BrowseEvent>>>,
    impl FnMut(BrowseEvent) -> ControlFlow<()> + 'static,
) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    (events, move |event| {
        sink.borrow_mut().push(event);
        ControlFlow::Continue(())
    })
}

/// Handle completions until the source has nothing left in flight
pub fn run(source: &mut ContentSource<ScriptedInvoker>) {
    for _ in 0..1000 {
        if source.dispatch_completions(Duration::ZERO) == 0 {
            return;
        }
    }
    panic!("source kept paging");
}

/// Handle exactly one queued completion
pub fn step(source: &mut ContentSource<ScriptedInvoker>) {
    let completion = source
        .invoker_mut()
        .next_completion(Duration::ZERO)
        .expect("a queued completion");
    source.complete_action(completion.handle, completion.outcome);
}
