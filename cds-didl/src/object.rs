//! Parsed DIDL-Lite objects

use serde::Serialize;

use crate::protocol_info::ProtocolInfo;

/// Whether a DIDL-Lite object is a leaf item or a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Item,
    Container,
}

/// One `<item>` or `<container>` element of a DIDL-Lite document.
///
/// Child elements are kept in document order. `<res>` children become
/// [`Resource`]s, every other child becomes a [`Property`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub kind: ObjectKind,
    /// Remote object id, absent on malformed objects
    pub id: Option<String>,
    pub parent_id: Option<String>,
    /// Attributes of the object element itself, keyed by local name
    pub attributes: Vec<(String, String)>,
    pub properties: Vec<Property>,
    pub resources: Vec<Resource>,
}

/// A non-resource child element such as `dc:title` or `upnp:albumArtURI`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    /// Qualified element name as written in the document
    pub name: String,
    pub value: String,
    pub attributes: Vec<(String, String)>,
}

/// A `<res>` element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub uri: String,
    /// Parsed `protocolInfo` attribute, when it has all four fields
    pub protocol_info: Option<ProtocolInfo>,
    /// All attributes, `protocolInfo` included, keyed by local name
    pub attributes: Vec<(String, String)>,
}

impl ContentItem {
    pub(crate) fn new(kind: ObjectKind, attributes: Vec<(String, String)>) -> Self {
        let id = lookup(&attributes, "id").map(str::to_string);
        let parent_id = lookup(&attributes, "parentID").map(str::to_string);
        Self {
            kind,
            id,
            parent_id,
            attributes,
            properties: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind == ObjectKind::Container
    }

    /// Value of an attribute on the object element
    pub fn attribute(&self, name: &str) -> Option<&str> {
        lookup(&self.attributes, name)
    }

    /// First property whose local name matches `local_name`
    pub fn property(&self, local_name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.local_name() == local_name)
            .map(|p| p.value.as_str())
    }

    /// Every property whose local name matches `local_name`, in document order
    pub fn properties_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.local_name() == local_name)
    }

    pub fn title(&self) -> Option<&str> {
        self.property("title")
    }

    /// The `upnp:class` string, e.g. `object.item.audioItem.musicTrack`
    pub fn class(&self) -> Option<&str> {
        self.property("class")
    }

    /// `childCount` of a container. Items never report one.
    pub fn child_count(&self) -> Option<u32> {
        if !self.is_container() {
            return None;
        }
        self.attribute("childCount")
            .and_then(|c| c.trim().parse().ok())
    }

    /// Resources reachable over the given transport protocol (`http-get` etc.)
    pub fn resources_for<'a>(
        &'a self,
        protocol: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.protocol() == Some(protocol))
    }
}

impl Property {
    /// Element name without its namespace prefix
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        lookup(&self.attributes, name)
    }
}

impl Resource {
    pub(crate) fn new(uri: String, attributes: Vec<(String, String)>) -> Self {
        let protocol_info = lookup(&attributes, "protocolInfo").and_then(ProtocolInfo::parse);
        Self {
            uri,
            protocol_info,
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        lookup(&self.attributes, name)
    }

    /// Transport protocol, the first protocolInfo field
    pub fn protocol(&self) -> Option<&str> {
        self.protocol_info.as_ref().map(|p| p.protocol.as_str())
    }

    /// MIME type, the third protocolInfo field
    pub fn mime_type(&self) -> Option<&str> {
        self.protocol_info.as_ref().map(|p| p.content_format.as_str())
    }
}

pub(crate) fn local(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}

fn lookup<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
