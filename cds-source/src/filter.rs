//! Browse filters and their translation into UPnP search criteria
//!
//! Hosts describe which objects they want with a small boolean expression
//! tree, usually written in an LDAP-like text form:
//!
//! ```text
//! (&(artist=Nirvana)(!(album~*Unplugged*)))
//! ```
//!
//! ContentDirectory `Search` has no `not` operator, so negation is pushed down
//! to the comparisons while compiling: operators are replaced by their
//! complements and `and`/`or` are swapped.
//!
//! Comparison values keep the host's escaping: a backslash followed by one of
//! `\ ( ) * "` stands for that character and a backslash followed by two hex
//! digits stands for that byte. An unescaped `*` in an approximate match is a
//! wildcard and may only appear at the start or end of the value.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::catalog::{self, PROTOCOL_INFO_TOKEN};
use crate::error::{CdsError, Result};

/// Characters that must be escaped in a comparison value
const SPECIAL: &[u8] = b"\\()*\"";

/// Comparison operator of a filter leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Lt,
    Gt,
    /// Substring match
    Approx,
    /// The property is present; carries no value
    Exists,
}

/// A browse filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    Comparison {
        key: String,
        op: FilterOp,
        value: Option<String>,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    pub fn comparison(key: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        FilterNode::Comparison {
            key: key.into(),
            op,
            value: Some(value.into()),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(key, FilterOp::Eq, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(key, FilterOp::Lt, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(key, FilterOp::Gt, value)
    }

    pub fn approx(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(key, FilterOp::Approx, value)
    }

    pub fn exists(key: impl Into<String>) -> Self {
        FilterNode::Comparison {
            key: key.into(),
            op: FilterOp::Exists,
            value: None,
        }
    }

    /// Parse the LDAP-like text form, e.g. `(&(a<b)(c>d))`
    pub fn parse(text: &str) -> Result<Self> {
        let mut scanner = Scanner::new(text);
        let node = scanner.expression()?;
        scanner.skip_whitespace();
        if scanner.peek().is_some() {
            return Err(scanner.error("trailing characters after expression"));
        }
        Ok(node)
    }

    /// Compile this filter into a UPnP `SearchCriteria` string
    pub fn to_search_criteria(&self) -> Result<String> {
        compile(self)
    }
}

impl std::ops::Not for FilterNode {
    type Output = FilterNode;

    fn not(self) -> FilterNode {
        FilterNode::Not(Box::new(self))
    }
}

impl FromStr for FilterNode {
    type Err = CdsError;

    fn from_str(s: &str) -> Result<Self> {
        FilterNode::parse(s)
    }
}

impl fmt::Display for FilterNode {
    /// Writes the LDAP-like text form accepted by [`FilterNode::parse`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterNode::Comparison { key, op, value } => {
                let symbol = match op {
                    FilterOp::Eq => "=",
                    FilterOp::Lt => "<",
                    FilterOp::Gt => ">",
                    FilterOp::Approx => "~",
                    FilterOp::Exists => "?",
                };
                write!(f, "({}{}{})", key, symbol, value.as_deref().unwrap_or(""))
            }
            FilterNode::And(children) | FilterNode::Or(children) => {
                f.write_str(if matches!(self, FilterNode::And(_)) { "(&" } else { "(|" })?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            FilterNode::Not(child) => write!(f, "(!{})", child),
        }
    }
}

/// Escape arbitrary text for use as a literal comparison value
pub fn escape_value(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\0' {
            escaped.push_str("\\00");
        } else {
            if c.is_ascii() && SPECIAL.contains(&(c as u8)) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
    }
    escaped
}

/// Translate a filter into UPnP search criteria.
///
/// The first invalid comparison aborts the whole translation.
pub fn compile(node: &FilterNode) -> Result<String> {
    let mut out = Vec::new();
    write_node(&mut out, node, false)?;
    let criteria = String::from_utf8(out).map_err(|_| {
        CdsError::InvalidSearchString("property value is not valid UTF-8".to_string())
    })?;
    trace!(%criteria, "compiled search criteria");
    Ok(criteria)
}

fn write_node(out: &mut Vec<u8>, node: &FilterNode, negate: bool) -> Result<()> {
    match node {
        FilterNode::Comparison { key, op, value } => {
            write_comparison(out, key, *op, value.as_deref(), negate)
        }
        FilterNode::And(children) => {
            write_composite(out, children, if negate { " or " } else { " and " }, negate)
        }
        FilterNode::Or(children) => {
            write_composite(out, children, if negate { " and " } else { " or " }, negate)
        }
        FilterNode::Not(child) => write_node(out, child, !negate),
    }
}

fn write_composite(
    out: &mut Vec<u8>,
    children: &[FilterNode],
    joiner: &str,
    negate: bool,
) -> Result<()> {
    match children {
        [] => Err(CdsError::InvalidSearchString(
            "composite expression without operands".to_string(),
        )),
        [only] => write_node(out, only, negate),
        _ => {
            for (index, child) in children.iter().enumerate() {
                if index > 0 {
                    out.extend_from_slice(joiner.as_bytes());
                }
                out.push(b'(');
                write_node(out, child, negate)?;
                out.push(b')');
            }
            Ok(())
        }
    }
}

fn write_comparison(
    out: &mut Vec<u8>,
    key: &str,
    op: FilterOp,
    value: Option<&str>,
    negate: bool,
) -> Result<()> {
    let token = catalog::filter_token(key);

    // protocolInfo is a delimited composite; exact equality never matches
    let op = if token == PROTOCOL_INFO_TOKEN && op == FilterOp::Eq {
        FilterOp::Approx
    } else {
        op
    };

    out.extend_from_slice(token.as_bytes());
    out.extend_from_slice(operator_token(op, negate).as_bytes());

    if op == FilterOp::Exists {
        return Ok(());
    }

    let value = value.ok_or_else(|| {
        CdsError::InvalidSearchString(format!("comparison on '{}' has no value", key))
    })?;

    out.push(b'"');
    write_value(out, value.as_bytes(), op == FilterOp::Approx)?;
    out.push(b'"');
    Ok(())
}

fn operator_token(op: FilterOp, negate: bool) -> &'static str {
    match (op, negate) {
        (FilterOp::Eq, false) => " = ",
        (FilterOp::Eq, true) => " != ",
        (FilterOp::Lt, false) => " < ",
        (FilterOp::Lt, true) => " >= ",
        (FilterOp::Gt, false) => " > ",
        (FilterOp::Gt, true) => " <= ",
        (FilterOp::Approx, false) => " contains ",
        (FilterOp::Approx, true) => " doesNotContain ",
        (FilterOp::Exists, false) => " exists true",
        (FilterOp::Exists, true) => " exists false",
    }
}

fn write_value(out: &mut Vec<u8>, raw: &[u8], approx: bool) -> Result<()> {
    let mut index = 0;
    while index < raw.len() {
        if approx && raw[index] == b'*' {
            if index == 0 || index + 1 == raw.len() {
                index += 1;
                continue;
            }
            return Err(CdsError::InvalidSearchString(
                "wildcards in the middle of approximated property values are not supported"
                    .to_string(),
            ));
        }

        let (byte, next) = unquote(raw, index).ok_or_else(|| {
            CdsError::InvalidSearchString("invalid escape sequence".to_string())
        })?;

        // Servers read NUL as end of string and it cannot be quoted
        if byte == 0 {
            return Err(CdsError::InvalidSearchString(
                "NUL in property value".to_string(),
            ));
        }

        if byte == b'\\' || byte == b'"' {
            out.push(b'\\');
        }
        out.push(byte);
        index = next;
    }
    Ok(())
}

/// Decode the byte starting at `index`, returning it and the index after it
fn unquote(raw: &[u8], index: usize) -> Option<(u8, usize)> {
    let first = *raw.get(index)?;
    if first != b'\\' {
        return Some((first, index + 1));
    }

    if let (Some(hi), Some(lo)) = (
        raw.get(index + 1).and_then(|b| hex(*b)),
        raw.get(index + 2).and_then(|b| hex(*b)),
    ) {
        return Some(((hi << 4) | lo, index + 3));
    }

    match raw.get(index + 1) {
        Some(escaped) if SPECIAL.contains(escaped) => Some((*escaped, index + 2)),
        _ => None,
    }
}

fn hex(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Cursor over the text form of a filter
struct Scanner<'a> {
    text: &'a str,
    cursor: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        trace!("scanning filter `{}`", text);
        Self { text, cursor: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.cursor).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.cursor += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.cursor += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn error(&self, message: &str) -> CdsError {
        CdsError::InvalidSearchString(format!("{} at position {}", message, self.cursor))
    }

    /// expression = "(" ( "&" list | "|" list | "!" expression | comparison ) ")"
    fn expression(&mut self) -> Result<FilterNode> {
        self.expect(b'(')?;
        self.skip_whitespace();

        let node = match self.peek() {
            Some(b'&') => {
                self.cursor += 1;
                FilterNode::And(self.list()?)
            }
            Some(b'|') => {
                self.cursor += 1;
                FilterNode::Or(self.list()?)
            }
            Some(b'!') => {
                self.cursor += 1;
                !self.expression()?
            }
            Some(_) => self.comparison()?,
            None => return Err(self.error("unexpected end of filter")),
        };

        self.expect(b')')?;
        Ok(node)
    }

    fn list(&mut self) -> Result<Vec<FilterNode>> {
        let mut children = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'(') => children.push(self.expression()?),
                _ => break,
            }
        }
        if children.is_empty() {
            return Err(self.error("expected at least one operand"));
        }
        Ok(children)
    }

    fn comparison(&mut self) -> Result<FilterNode> {
        let start = self.cursor;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'=' | b'<' | b'>' | b'~' | b'?' | b'(' | b')') {
                break;
            }
            self.cursor += 1;
        }
        let key = self.text[start..self.cursor].trim();
        if key.is_empty() {
            return Err(self.error("missing key"));
        }

        let op = match self.peek() {
            Some(b'=') => FilterOp::Eq,
            Some(b'<') => FilterOp::Lt,
            Some(b'>') => FilterOp::Gt,
            Some(b'~') => FilterOp::Approx,
            Some(b'?') => FilterOp::Exists,
            _ => return Err(self.error("expected comparison operator")),
        };
        self.cursor += 1;

        if op == FilterOp::Exists {
            return Ok(FilterNode::exists(key));
        }

        let start = self.cursor;
        while let Some(byte) = self.peek() {
            match byte {
                b')' => break,
                // An escape always covers the next byte
                b'\\' => self.cursor += 2,
                _ => self.cursor += 1,
            }
        }
        if self.cursor > self.text.len() {
            return Err(CdsError::InvalidSearchString(
                "filter ends inside an escape sequence".to_string(),
            ));
        }
        let value = self.text.get(start..self.cursor).ok_or_else(|| {
            self.error("escape sequence splits a character")
        })?;

        Ok(FilterNode::comparison(key, op, value))
    }
}
