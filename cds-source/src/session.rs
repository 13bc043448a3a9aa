//! Paging state of one browse
//!
//! A [`BrowseSession`] decides which page to request next and how many items
//! are still to be delivered. It never calls back into the host; the
//! [`ContentSource`](crate::ContentSource) drives it and emits the events.

use tracing::warn;

use crate::catalog::KeySet;
use crate::source::BrowseId;
use crate::transport::{ActionHandle, ActionRequest, BrowseFlag};

/// Lifecycle of a browse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No page requested yet
    Created,
    /// A page request is in flight or its items are being delivered
    Requesting,
    /// Finished; nothing more is requested or emitted
    Terminated,
}

/// Arguments fixed for the whole browse, already in protocol form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBrowse {
    /// Remote id of the browsed or searched container
    pub container_id: String,
    /// `SearchCriteria`; `None` browses direct children instead
    pub search_criteria: Option<String>,
    pub sort_criteria: String,
    /// `Filter` argument
    pub result_filter: String,
    pub keys: KeySet,
    pub skip_count: u32,
    /// 0 means every item
    pub item_count: u32,
}

/// Position of one emitted item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSlot {
    /// Absolute index in the server's result list
    pub index: u32,
    /// Items still to come after this one
    pub remaining: u32,
}

#[derive(Debug)]
pub struct BrowseSession {
    id: BrowseId,
    browse: CompiledBrowse,
    state: SessionState,
    pending: Option<ActionHandle>,
    /// Unknown until the first page arrives
    remaining: Option<u32>,
    emitted: u32,
    total_matches: Option<u32>,
}

impl BrowseSession {
    pub fn new(id: BrowseId, browse: CompiledBrowse) -> Self {
        Self {
            id,
            browse,
            state: SessionState::Created,
            pending: None,
            remaining: None,
            emitted: 0,
            total_matches: None,
        }
    }

    pub fn id(&self) -> BrowseId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    pub fn keys(&self) -> &KeySet {
        &self.browse.keys
    }

    pub fn compiled(&self) -> &CompiledBrowse {
        &self.browse
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// Items delivered so far
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Index the next item will carry
    pub fn current_index(&self) -> u32 {
        self.browse.skip_count.saturating_add(self.emitted)
    }

    pub fn pending(&self) -> Option<ActionHandle> {
        self.pending
    }

    /// The next page to request, or `None` when nothing is left to fetch
    pub fn next_request(&self, page_size: u32) -> Option<ActionRequest> {
        if self.is_terminated() || self.remaining == Some(0) {
            return None;
        }

        let requested_count = if self.browse.item_count == 0 {
            page_size
        } else {
            let left = self.browse.item_count.checked_sub(self.emitted)?;
            if left == 0 {
                return None;
            }
            page_size.min(left)
        };
        let starting_index = self.current_index();

        let request = match &self.browse.search_criteria {
            Some(search_criteria) => ActionRequest::Search {
                container_id: self.browse.container_id.clone(),
                search_criteria: search_criteria.clone(),
                filter: self.browse.result_filter.clone(),
                starting_index,
                requested_count,
                sort_criteria: self.browse.sort_criteria.clone(),
            },
            None => ActionRequest::Browse {
                object_id: self.browse.container_id.clone(),
                flag: BrowseFlag::DirectChildren,
                filter: self.browse.result_filter.clone(),
                starting_index,
                requested_count,
                sort_criteria: self.browse.sort_criteria.clone(),
            },
        };
        Some(request)
    }

    /// Record that the page request `handle` is in flight
    pub fn page_requested(&mut self, handle: ActionHandle) {
        if !self.is_terminated() {
            self.state = SessionState::Requesting;
            self.pending = Some(handle);
        }
    }

    /// Forget the in-flight request once its completion has arrived
    pub fn page_completed(&mut self, handle: ActionHandle) -> bool {
        if self.pending == Some(handle) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Account for a page reporting `total_matches`, returning the number of
    /// items still to deliver.
    ///
    /// The first page fixes the remaining count. Later pages only log when
    /// the server's total moves.
    pub fn page_received(&mut self, total_matches: u32) -> u32 {
        match self.total_matches {
            None => {
                let available = total_matches.saturating_sub(self.browse.skip_count);
                let remaining = if self.browse.item_count == 0 {
                    available
                } else {
                    available.min(self.browse.item_count)
                };
                self.total_matches = Some(total_matches);
                self.remaining = Some(remaining);
            }
            Some(previous) if previous != total_matches => {
                warn!(
                    browse_id = %self.id,
                    previous,
                    total_matches,
                    "total matches changed while paging"
                );
            }
            Some(_) => {}
        }
        self.remaining.unwrap_or(0)
    }

    /// Claim the slot for the next item of the current page.
    ///
    /// Returns `None` once every expected item has been delivered; servers
    /// returning more than asked for are cut off here.
    pub fn next_item(&mut self) -> Option<ItemSlot> {
        if self.is_terminated() {
            return None;
        }
        let remaining = self.remaining?.checked_sub(1)?;
        let index = self.current_index();
        self.remaining = Some(remaining);
        self.emitted += 1;
        Some(ItemSlot { index, remaining })
    }

    /// Whether every expected item has been delivered
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// End the session. Returns `true` only for the call that actually
    /// terminated it, along with the request that was still in flight.
    pub fn terminate(&mut self) -> (bool, Option<ActionHandle>) {
        if self.is_terminated() {
            return (false, None);
        }
        self.state = SessionState::Terminated;
        (true, self.pending.take())
    }
}
