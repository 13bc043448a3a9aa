//! Sort criteria
//!
//! Hosts pass sort orders as `+key,-key`. The keys are translated through the
//! catalog to the property names the server sorts on.

use std::str::FromStr;

use crate::catalog;
use crate::error::{CdsError, Result};

/// An ordered list of `(key, ascending)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    terms: Vec<(String, bool)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, key: impl Into<String>) -> Self {
        self.terms.push((key.into(), true));
        self
    }

    pub fn descending(mut self, key: impl Into<String>) -> Self {
        self.terms.push((key.into(), false));
        self
    }

    pub fn terms(&self) -> &[(String, bool)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Parse `+title,-album`. Every term needs an explicit direction.
    pub fn parse(text: &str) -> Result<Self> {
        let mut spec = Self::new();
        for term in text.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (ascending, key) = if let Some(key) = term.strip_prefix('+') {
                (true, key.trim())
            } else if let Some(key) = term.strip_prefix('-') {
                (false, key.trim())
            } else {
                return Err(CdsError::InvalidSearchString(format!(
                    "sort term '{}' has no direction",
                    term
                )));
            };
            if key.is_empty() {
                return Err(CdsError::InvalidSearchString(format!(
                    "sort term '{}' has no key",
                    term
                )));
            }
            spec.terms.push((key.to_string(), ascending));
        }
        Ok(spec)
    }

    /// `SortCriteria` argument, e.g. `+dc:title,-upnp:album`
    pub fn to_criteria(&self) -> String {
        self.terms
            .iter()
            .map(|(key, ascending)| {
                format!(
                    "{}{}",
                    if *ascending { '+' } else { '-' },
                    catalog::filter_token(key)
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for SortSpec {
    type Err = CdsError;

    fn from_str(s: &str) -> Result<Self> {
        SortSpec::parse(s)
    }
}
