//! ContentDirectory actions and the invoker seam
//!
//! [`ContentSource`](crate::ContentSource) never talks to the network itself.
//! It starts actions through an [`ActionInvoker`] and is handed their outcomes
//! later, so the same paging logic runs over SOAP or over a scripted test
//! double.

use std::fmt;
use std::time::Duration;

use crate::error::{CdsError, Result};

/// Identifies one started action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionHandle(pub u64);

impl fmt::Display for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `BrowseFlag` argument of the Browse action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseFlag {
    DirectChildren,
    Metadata,
}

impl BrowseFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            BrowseFlag::DirectChildren => "BrowseDirectChildren",
            BrowseFlag::Metadata => "BrowseMetadata",
        }
    }
}

/// A Browse or Search action with all of its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    Browse {
        object_id: String,
        flag: BrowseFlag,
        filter: String,
        starting_index: u32,
        requested_count: u32,
        sort_criteria: String,
    },
    Search {
        container_id: String,
        search_criteria: String,
        filter: String,
        starting_index: u32,
        requested_count: u32,
        sort_criteria: String,
    },
}

impl ActionRequest {
    /// SOAP action name
    pub fn action(&self) -> &'static str {
        match self {
            ActionRequest::Browse { .. } => "Browse",
            ActionRequest::Search { .. } => "Search",
        }
    }

    pub fn starting_index(&self) -> u32 {
        match self {
            ActionRequest::Browse { starting_index, .. }
            | ActionRequest::Search { starting_index, .. } => *starting_index,
        }
    }

    pub fn requested_count(&self) -> u32 {
        match self {
            ActionRequest::Browse {
                requested_count, ..
            }
            | ActionRequest::Search {
                requested_count, ..
            } => *requested_count,
        }
    }

    /// Action arguments in the order the service declares them
    pub fn args(&self) -> Vec<(&'static str, String)> {
        match self {
            ActionRequest::Browse {
                object_id,
                flag,
                filter,
                starting_index,
                requested_count,
                sort_criteria,
            } => vec![
                ("ObjectID", object_id.clone()),
                ("BrowseFlag", flag.as_str().to_string()),
                ("Filter", filter.clone()),
                ("StartingIndex", starting_index.to_string()),
                ("RequestedCount", requested_count.to_string()),
                ("SortCriteria", sort_criteria.clone()),
            ],
            ActionRequest::Search {
                container_id,
                search_criteria,
                filter,
                starting_index,
                requested_count,
                sort_criteria,
            } => vec![
                ("ContainerID", container_id.clone()),
                ("SearchCriteria", search_criteria.clone()),
                ("Filter", filter.clone()),
                ("StartingIndex", starting_index.to_string()),
                ("RequestedCount", requested_count.to_string()),
                ("SortCriteria", sort_criteria.clone()),
            ],
        }
    }
}

/// Output arguments shared by Browse and Search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResponse {
    /// DIDL-Lite document, `None` when the service left it out
    pub result: Option<String>,
    pub number_returned: u32,
    pub total_matches: u32,
}

impl ActionResponse {
    /// Read the output arguments of a `BrowseResponse` or `SearchResponse`
    /// element. Missing counters read as zero.
    pub fn from_element(xml: &xmltree::Element) -> Result<Self> {
        let result = xml
            .get_child("Result")
            .and_then(|e| e.get_text())
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty());

        Ok(ActionResponse {
            result,
            number_returned: counter(xml, "NumberReturned")?,
            total_matches: counter(xml, "TotalMatches")?,
        })
    }
}

fn counter(xml: &xmltree::Element, name: &str) -> Result<u32> {
    match xml.get_child(name).and_then(|e| e.get_text()) {
        Some(text) => text.trim().parse().map_err(|_| {
            CdsError::ResultParseFailed(format!("{} is not a number: '{}'", name, text))
        }),
        None => Ok(0),
    }
}

/// Outcome of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub handle: ActionHandle,
    pub outcome: Result<ActionResponse>,
}

/// Starts ContentDirectory actions and reports their completions.
///
/// Completions are collected with [`next_completion`](Self::next_completion)
/// and handed to [`ContentSource::complete_action`](crate::ContentSource::complete_action).
pub trait ActionInvoker {
    /// Start an action. Errors here mean the action never started.
    fn begin_action(&mut self, request: ActionRequest) -> Result<ActionHandle>;

    /// Abandon an action. Its completion, if any, must not be reported.
    fn cancel_action(&mut self, handle: ActionHandle);

    /// Wait up to `timeout` for the next finished action
    fn next_completion(&mut self, timeout: Duration) -> Option<Completion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(xml: &str) -> xmltree::Element {
        xmltree::Element::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_browse_args() {
        let request = ActionRequest::Browse {
            object_id: "0".to_string(),
            flag: BrowseFlag::DirectChildren,
            filter: "dc:title".to_string(),
            starting_index: 10,
            requested_count: 5,
            sort_criteria: String::new(),
        };
        assert_eq!(request.action(), "Browse");
        let args = request.args();
        assert_eq!(args[1], ("BrowseFlag", "BrowseDirectChildren".to_string()));
        assert_eq!(args[3], ("StartingIndex", "10".to_string()));
        assert_eq!(args[4], ("RequestedCount", "5".to_string()));
    }

    #[test]
    fn test_search_args() {
        let request = ActionRequest::Search {
            container_id: "7".to_string(),
            search_criteria: "upnp:artist = \"A\"".to_string(),
            filter: "*".to_string(),
            starting_index: 0,
            requested_count: 50,
            sort_criteria: "+dc:title".to_string(),
        };
        assert_eq!(request.action(), "Search");
        let names: Vec<_> = request.args().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "ContainerID",
                "SearchCriteria",
                "Filter",
                "StartingIndex",
                "RequestedCount",
                "SortCriteria"
            ]
        );
        assert_eq!(request.requested_count(), 50);
    }

    #[test]
    fn test_response_from_element() {
        let xml = element(
            "<BrowseResponse><Result>&lt;DIDL-Lite/&gt;</Result><NumberReturned>3</NumberReturned><TotalMatches>8</TotalMatches><UpdateID>1</UpdateID></BrowseResponse>",
        );
        let response = ActionResponse::from_element(&xml).unwrap();
        assert_eq!(response.result.as_deref(), Some("<DIDL-Lite/>"));
        assert_eq!(response.number_returned, 3);
        assert_eq!(response.total_matches, 8);
    }

    #[test]
    fn test_response_without_result() {
        let xml = element("<BrowseResponse><Result></Result><TotalMatches>0</TotalMatches></BrowseResponse>");
        let response = ActionResponse::from_element(&xml).unwrap();
        assert_eq!(response, ActionResponse::default());
    }

    #[test]
    fn test_response_with_bad_counter() {
        let xml = element("<BrowseResponse><NumberReturned>many</NumberReturned></BrowseResponse>");
        assert!(matches!(
            ActionResponse::from_element(&xml),
            Err(CdsError::ResultParseFailed(_))
        ));
    }
}
