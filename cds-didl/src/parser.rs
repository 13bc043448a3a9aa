//! Event-driven DIDL-Lite reader

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ParseError, ParseResult};
use crate::object::{local, ContentItem, ObjectKind, Property, Resource};

const ROOT: &str = "DIDL-Lite";

/// Reads DIDL-Lite documents and reports each object through a callback.
///
/// The parser holds no per-document state, so one instance can serve any
/// number of documents.
#[derive(Debug, Clone, Default)]
pub struct DidlParser {
    _private: (),
}

/// A direct child of the object being read
struct Child {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
}

impl DidlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `xml` and call `on_object` for every item and container, in
    /// document order. Returns the number of objects reported.
    ///
    /// Objects are reported as soon as they are complete, so a document that
    /// turns out to be malformed further down may already have reported some.
    pub fn parse<F>(&self, xml: &str, mut on_object: F) -> ParseResult<usize>
    where
        F: FnMut(ContentItem),
    {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut open: Vec<String> = Vec::new();
        let mut object: Option<ContentItem> = None;
        let mut child: Option<Child> = None;
        let mut root_seen = false;
        let mut count = 0;

        loop {
            let event = reader.read_event().map_err(|e| ParseError::Xml {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?;

            match event {
                Event::Start(start) => {
                    let name = element_name(&start);
                    let position = reader.buffer_position();
                    self.open_element(&start, &name, open.len(), position, &mut object, &mut child)?;
                    root_seen = true;
                    open.push(name);
                }
                Event::Empty(start) => {
                    let name = element_name(&start);
                    let depth = open.len();
                    let position = reader.buffer_position();
                    self.open_element(&start, &name, depth, position, &mut object, &mut child)?;
                    root_seen = true;
                    if close_element(depth, &mut object, &mut child, &mut on_object) {
                        count += 1;
                    }
                }
                Event::End(_) => {
                    open.pop();
                    if close_element(open.len(), &mut object, &mut child, &mut on_object) {
                        count += 1;
                    }
                }
                Event::Text(text) => {
                    if let Some(child) = child.as_mut() {
                        let text = text.unescape().map_err(|e| ParseError::Xml {
                            position: reader.buffer_position(),
                            message: e.to_string(),
                        })?;
                        child.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(child) = child.as_mut() {
                        child.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(unclosed) = open.pop() {
            return Err(ParseError::UnexpectedEof(unclosed));
        }
        if !root_seen {
            return Err(ParseError::InvalidStructure(format!(
                "document has no <{}> root element",
                ROOT
            )));
        }

        Ok(count)
    }

    fn open_element(
        &self,
        start: &BytesStart<'_>,
        name: &str,
        depth: usize,
        position: usize,
        object: &mut Option<ContentItem>,
        child: &mut Option<Child>,
    ) -> ParseResult<()> {
        match depth {
            0 => {
                if local(name) != ROOT {
                    return Err(ParseError::InvalidStructure(format!(
                        "expected <{}> root element, found <{}>",
                        ROOT, name
                    )));
                }
            }
            1 => {
                let kind = match local(name) {
                    "item" => ObjectKind::Item,
                    "container" => ObjectKind::Container,
                    // <desc> and vendor extensions are not objects
                    _ => return Ok(()),
                };
                *object = Some(ContentItem::new(kind, attributes(start, position)?));
            }
            2 if object.is_some() => {
                *child = Some(Child {
                    name: name.to_string(),
                    attributes: attributes(start, position)?,
                    text: String::new(),
                });
            }
            // Deeper elements only contribute their text to the enclosing child
            _ => {}
        }
        Ok(())
    }
}

/// Finish the element that was opened at `depth`. Returns true when a whole
/// object was reported.
fn close_element<F>(
    depth: usize,
    object: &mut Option<ContentItem>,
    child: &mut Option<Child>,
    on_object: &mut F,
) -> bool
where
    F: FnMut(ContentItem),
{
    match depth {
        2 => {
            if let (Some(object), Some(child)) = (object.as_mut(), child.take()) {
                if local(&child.name) == "res" {
                    object
                        .resources
                        .push(Resource::new(child.text.trim().to_string(), child.attributes));
                } else {
                    object.properties.push(Property {
                        name: child.name,
                        value: child.text.trim().to_string(),
                        attributes: child.attributes,
                    });
                }
            }
            false
        }
        1 => match object.take() {
            Some(finished) => {
                on_object(finished);
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn attributes(start: &BytesStart<'_>, position: usize) -> ParseResult<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml {
            position,
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr.unescape_value().map_err(|e| ParseError::Xml {
            position,
            message: e.to_string(),
        })?;
        attributes.push((local(&key).to_string(), value.into_owned()));
    }
    Ok(attributes)
}
