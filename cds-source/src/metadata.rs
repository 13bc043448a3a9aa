//! Turning parsed DIDL-Lite objects into host metadata
//!
//! Keys are resolved in a fixed order. Each step removes the keys it is
//! responsible for from a working set, whether or not it produced a value, and
//! whatever is left at the end goes through a generic property lookup.

use std::collections::BTreeMap;

use cds_didl::{parse_duration, parse_resolution, ContentItem, Resource};
use serde::Serialize;

use crate::catalog::{KeySet, MetadataKey, ValueType};

/// MIME type reported for containers
pub const MIME_CONTAINER: &str = "x-mafw/container";
/// MIME type for audio items whose resources disagree on the format
pub const MIME_AUDIO: &str = "audio/x-mafw";
/// MIME type for video items whose resources disagree on the format
pub const MIME_VIDEO: &str = "video/x-mafw";

const CLASS_AUDIO: &str = "object.item.audioItem";
const CLASS_VIDEO: &str = "object.item.videoItem";

/// Keys read from the single supported resource
const RESOURCE_KEYS: &[MetadataKey] = &[
    MetadataKey::Duration,
    MetadataKey::Filesize,
    MetadataKey::Bitrate,
    MetadataKey::AudioBitrate,
    MetadataKey::VideoBitrate,
    MetadataKey::ResX,
    MetadataKey::ResY,
    MetadataKey::Bpp,
];

/// A single metadata value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Metadata of one object: key name to one or more values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata {
    values: BTreeMap<String, Vec<MetadataValue>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `key`
    pub fn add(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.values.entry(key.into()).or_default().push(value);
    }

    /// First value of `key`
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.values.get(key).and_then(|values| values.first())
    }

    /// Every value of `key`
    pub fn get_all(&self, key: &str) -> &[MetadataValue] {
        self.values.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Audio,
    Video,
    Unsupported,
}

impl Classification {
    fn of(item: &ContentItem) -> Self {
        match item.class() {
            Some(class) if class.starts_with(CLASS_AUDIO) => Classification::Audio,
            Some(class) if class.starts_with(CLASS_VIDEO) => Classification::Video,
            _ => Classification::Unsupported,
        }
    }

    fn mime_prefix(self) -> Option<&'static str> {
        match self {
            Classification::Audio => Some("audio/"),
            Classification::Video => Some("video/"),
            Classification::Unsupported => None,
        }
    }

    /// Synthetic MIME for resources of mixed types, `first` for classes
    /// without one
    fn mixed_mime<'a>(self, first: &'a str) -> &'a str {
        match self {
            Classification::Audio => MIME_AUDIO,
            Classification::Video => MIME_VIDEO,
            Classification::Unsupported => first,
        }
    }
}

/// Builds [`Metadata`] for parsed objects.
///
/// Only resources served over `transport_protocol` are considered.
#[derive(Debug, Clone)]
pub struct MetadataCompiler {
    transport_protocol: String,
}

impl MetadataCompiler {
    pub fn new(transport_protocol: impl Into<String>) -> Self {
        Self {
            transport_protocol: transport_protocol.into(),
        }
    }

    pub fn transport_protocol(&self) -> &str {
        &self.transport_protocol
    }

    /// Resolve `keys` for `item`. `raw_document` is reported for the `didl`
    /// key when present.
    pub fn compile(
        &self,
        keys: &KeySet,
        item: &ContentItem,
        raw_document: Option<&str>,
    ) -> Metadata {
        let mut pending = keys.clone();
        let mut metadata = Metadata::new();

        if pending.remove(MetadataKey::Title) {
            if let Some(title) = non_empty(item.title()) {
                add_str(&mut metadata, MetadataKey::Title, title);
            }
        }

        if pending.remove(MetadataKey::ChildCount) {
            if let Some(count) = item.child_count() {
                metadata.add(MetadataKey::ChildCount.name(), MetadataValue::Int(count.into()));
            }
        }

        let classification = Classification::of(item);

        // Video and image thumbnails are not extracted
        if pending.remove(MetadataKey::ThumbnailUri) && classification == Classification::Audio {
            if let Some(art) = non_empty(item.property("albumArtURI")) {
                add_str(&mut metadata, MetadataKey::ThumbnailUri, art);
            }
        }

        if pending.remove(MetadataKey::Didl) {
            if let Some(document) = non_empty(raw_document) {
                add_str(&mut metadata, MetadataKey::Didl, document);
            }
        }

        let supported: Vec<&Resource> = item.resources_for(&self.transport_protocol).collect();

        if pending.remove(MetadataKey::MimeType) {
            if let Some(mime) = mime_type(item, &supported, classification) {
                add_str(&mut metadata, MetadataKey::MimeType, mime);
            }
        }

        let single = match supported.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        for &key in RESOURCE_KEYS {
            if pending.remove(key) {
                if let Some(value) = single.and_then(|res| resource_value(key, res)) {
                    metadata.add(key.name(), MetadataValue::Int(value));
                }
            }
        }

        if pending.remove(MetadataKey::Uri) {
            for uri in uris(&supported, classification) {
                add_str(&mut metadata, MetadataKey::Uri, uri);
            }
        }

        if pending.remove(MetadataKey::IsSeekable) && !item.is_container() {
            let seekable = supported
                .first()
                .and_then(|res| res.protocol_info.as_ref())
                .and_then(|info| info.dlna_operation())
                .map_or(false, |op| op.range);
            metadata.add(MetadataKey::IsSeekable.name(), MetadataValue::Bool(seekable));
        }

        for key in pending.iter() {
            let entry = key.entry();
            let Some(property) = entry.property else {
                continue;
            };
            let raw = non_empty(item.property(property))
                .or_else(|| supported.first().and_then(|res| non_empty(res.attribute(property))));
            if let Some(value) = raw.and_then(|raw| coerce(raw, entry.value_type)) {
                metadata.add(entry.name, value);
            }
        }

        metadata
    }
}

fn add_str(metadata: &mut Metadata, key: MetadataKey, value: &str) {
    metadata.add(key.name(), MetadataValue::Str(value.to_string()));
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn mime_type<'a>(
    item: &'a ContentItem,
    supported: &[&'a Resource],
    classification: Classification,
) -> Option<&'a str> {
    if item.is_container() {
        return Some(MIME_CONTAINER);
    }

    let mut mimes = supported.iter().filter_map(|res| non_empty(res.mime_type()));
    let first = mimes.next()?;
    if mimes.all(|mime| mime == first) {
        Some(first)
    } else {
        Some(classification.mixed_mime(first))
    }
}

fn uris<'a>(supported: &[&'a Resource], classification: Classification) -> Vec<&'a str> {
    let matching: Vec<&str> = match classification.mime_prefix() {
        Some(prefix) => supported
            .iter()
            .filter(|res| res.mime_type().map_or(false, |mime| mime.starts_with(prefix)))
            .filter_map(|res| non_empty(Some(res.uri.as_str())))
            .collect(),
        None => Vec::new(),
    };

    if !matching.is_empty() {
        return matching;
    }
    supported
        .iter()
        .filter_map(|res| non_empty(Some(res.uri.as_str())))
        .collect()
}

fn resource_value(key: MetadataKey, res: &Resource) -> Option<i64> {
    match key {
        MetadataKey::Duration => res.attribute("duration").and_then(parse_duration).map(i64::from),
        MetadataKey::ResX => res
            .attribute("resolution")
            .and_then(parse_resolution)
            .map(|(width, _)| i64::from(width)),
        MetadataKey::ResY => res
            .attribute("resolution")
            .and_then(parse_resolution)
            .map(|(_, height)| i64::from(height)),
        _ => key
            .entry()
            .property
            .and_then(|attribute| res.attribute(attribute))
            .and_then(leading_integer),
    }
}

fn coerce(raw: &str, value_type: ValueType) -> Option<MetadataValue> {
    match value_type {
        ValueType::String => Some(MetadataValue::Str(raw.to_string())),
        ValueType::Int => leading_integer(raw).map(MetadataValue::Int),
        ValueType::Bool => match raw {
            "1" | "true" | "TRUE" => Some(MetadataValue::Bool(true)),
            "0" | "false" | "FALSE" => Some(MetadataValue::Bool(false)),
            _ => None,
        },
    }
}

/// Integer prefix of a value, so `2008-05-01` reads as 2008
fn leading_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let sign_len = usize::from(raw.starts_with(['-', '+']));
    let digits = raw[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    raw[..sign_len + digits].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cds_didl::DidlParser;
    use rstest::rstest;

    fn parse(xml: &str) -> ContentItem {
        let mut items = Vec::new();
        DidlParser::new().parse(xml, |item| items.push(item)).unwrap();
        items.remove(0)
    }

    fn item_xml(class: &str, resources: &str) -> String {
        format!(
            r#"<DIDL-Lite><item id="1" parentID="0"><dc:title>T</dc:title><upnp:class>{}</upnp:class><upnp:albumArtURI>http://h/art.png</upnp:albumArtURI>{}</item></DIDL-Lite>"#,
            class, resources
        )
    }

    fn compile(keys: &[&str], item: &ContentItem) -> Metadata {
        MetadataCompiler::new("http-get").compile(&KeySet::from_names(keys), item, None)
    }

    #[test]
    fn test_container_mime_ignores_resources() {
        let container = parse(
            r#"<DIDL-Lite><container id="5" childCount="3"><res protocolInfo="http-get:*:audio/x-mpegurl:*">http://h/list.m3u</res></container></DIDL-Lite>"#,
        );
        let metadata = compile(&["mime-type", "childcount"], &container);
        assert_eq!(metadata.get("mime-type").and_then(|v| v.as_str()), Some(MIME_CONTAINER));
        assert_eq!(metadata.get("childcount").and_then(|v| v.as_int()), Some(3));
    }

    #[test]
    fn test_items_have_no_child_count() {
        let item = parse(&item_xml("object.item.audioItem", ""));
        assert!(!compile(&["childcount"], &item).contains_key("childcount"));
    }

    #[rstest]
    #[case("object.item.audioItem.musicTrack", r#"<res protocolInfo="http-get:*:audio/mpeg:*">http://h/a.mp3</res>"#, Some("audio/mpeg"))]
    #[case("object.item.audioItem.musicTrack", r#"<res protocolInfo="http-get:*:audio/mpeg:*">http://h/a.mp3</res><res protocolInfo="http-get:*:audio/mpeg:*">http://h/b.mp3</res>"#, Some("audio/mpeg"))]
    #[case("object.item.audioItem.musicTrack", r#"<res protocolInfo="http-get:*:audio/mpeg:*">http://h/a.mp3</res><res protocolInfo="http-get:*:audio/x-ms-wma:*">http://h/a.wma</res>"#, Some(MIME_AUDIO))]
    #[case("object.item.videoItem.movie", r#"<res protocolInfo="http-get:*:video/mp4:*">http://h/a.mp4</res><res protocolInfo="http-get:*:video/avi:*">http://h/a.avi</res>"#, Some(MIME_VIDEO))]
    #[case("object.item.imageItem.photo", r#"<res protocolInfo="http-get:*:image/jpeg:*">http://h/a.jpg</res><res protocolInfo="http-get:*:image/png:*">http://h/a.png</res>"#, Some("image/jpeg"))]
    #[case("object.item.audioItem.musicTrack", r#"<res protocolInfo="rtsp-rtp-udp:*:audio/mpeg:*">rtsp://h/a</res>"#, None)]
    fn test_item_mime(#[case] class: &str, #[case] resources: &str, #[case] expected: Option<&str>) {
        let item = parse(&item_xml(class, resources));
        let metadata = compile(&["mime-type"], &item);
        assert_eq!(metadata.get("mime-type").and_then(|v| v.as_str()), expected);
    }

    #[test]
    fn test_single_resource_fields() {
        let item = parse(&item_xml(
            "object.item.videoItem",
            r#"<res protocolInfo="http-get:*:video/mp4:*" duration="1:00:01.5" size="1024" bitrate="320" resolution="640x480" colorDepth="24">http://h/v.mp4</res>"#,
        ));
        let metadata = compile(
            &["duration", "filesize", "bitrate", "video-bitrate", "res-x", "res-y", "bpp"],
            &item,
        );
        assert_eq!(metadata.get("duration").and_then(|v| v.as_int()), Some(3601));
        assert_eq!(metadata.get("filesize").and_then(|v| v.as_int()), Some(1024));
        assert_eq!(metadata.get("bitrate").and_then(|v| v.as_int()), Some(320));
        assert_eq!(metadata.get("video-bitrate").and_then(|v| v.as_int()), Some(320));
        assert_eq!(metadata.get("res-x").and_then(|v| v.as_int()), Some(640));
        assert_eq!(metadata.get("res-y").and_then(|v| v.as_int()), Some(480));
        assert_eq!(metadata.get("bpp").and_then(|v| v.as_int()), Some(24));
    }

    #[test]
    fn test_resource_fields_omitted_when_ambiguous() {
        let item = parse(&item_xml(
            "object.item.audioItem",
            r#"<res protocolInfo="http-get:*:audio/mpeg:*" duration="0:01:00">http://h/a.mp3</res><res protocolInfo="http-get:*:audio/wav:*" duration="0:01:00">http://h/a.wav</res>"#,
        ));
        let metadata = compile(&["duration", "filesize"], &item);
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_uris_follow_classification() {
        let item = parse(&item_xml(
            "object.item.audioItem",
            r#"<res protocolInfo="http-get:*:image/jpeg:*">http://h/cover.jpg</res><res protocolInfo="http-get:*:audio/mpeg:*">http://h/a.mp3</res><res protocolInfo="rtsp-rtp-udp:*:audio/mpeg:*">rtsp://h/a</res>"#,
        ));
        let metadata = compile(&["uri"], &item);
        assert_eq!(metadata.get_all("uri"), &[MetadataValue::Str("http://h/a.mp3".to_string())]);
    }

    #[test]
    fn test_uris_fall_back_to_every_supported_resource() {
        let item = parse(&item_xml(
            "object.item.imageItem",
            r#"<res protocolInfo="http-get:*:image/jpeg:*">http://h/a.jpg</res><res protocolInfo="http-get:*:image/png:*">http://h/a.png</res>"#,
        ));
        let metadata = compile(&["uri"], &item);
        assert_eq!(metadata.get_all("uri").len(), 2);
    }

    #[rstest]
    #[case("http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01", Some(true))]
    #[case("http-get:*:audio/mpeg:DLNA.ORG_OP=10", Some(false))]
    #[case("http-get:*:audio/mpeg:*", Some(false))]
    fn test_seekability(#[case] protocol_info: &str, #[case] expected: Option<bool>) {
        let item = parse(&item_xml(
            "object.item.audioItem",
            &format!(r#"<res protocolInfo="{}">http://h/a.mp3</res>"#, protocol_info),
        ));
        let metadata = compile(&["is-seekable"], &item);
        assert_eq!(metadata.get("is-seekable").and_then(|v| v.as_bool()), expected);
    }

    #[test]
    fn test_item_without_resources_is_not_seekable() {
        let item = parse(&item_xml("object.item.audioItem", ""));
        let metadata = compile(&["is-seekable"], &item);
        assert_eq!(metadata.get("is-seekable"), Some(&MetadataValue::Bool(false)));
    }

    #[test]
    fn test_containers_have_no_seekability() {
        let container = parse(r#"<DIDL-Lite><container id="5"/></DIDL-Lite>"#);
        assert!(compile(&["is-seekable"], &container).is_empty());
    }

    #[test]
    fn test_thumbnail_only_for_audio() {
        let audio = parse(&item_xml("object.item.audioItem", ""));
        assert_eq!(
            compile(&["thumbnail-uri"], &audio).get("thumbnail-uri").and_then(|v| v.as_str()),
            Some("http://h/art.png")
        );

        let video = parse(&item_xml("object.item.videoItem", ""));
        assert!(compile(&["thumbnail-uri"], &video).is_empty());
    }

    #[test]
    fn test_didl_passthrough() {
        let xml = item_xml("object.item.audioItem", "");
        let item = parse(&xml);
        let compiler = MetadataCompiler::new("http-get");
        let keys = KeySet::from_names(["didl"]);

        let metadata = compiler.compile(&keys, &item, Some(&xml));
        assert_eq!(metadata.get("didl").and_then(|v| v.as_str()), Some(xml.as_str()));
        assert!(compiler.compile(&keys, &item, None).is_empty());
    }

    #[test]
    fn test_generic_lookup_coerces_types() {
        let item = parse(
            r#"<DIDL-Lite><item id="1"><upnp:class>object.item.audioItem</upnp:class><upnp:artist>A</upnp:artist><dc:date>2008-05-01</dc:date><upnp:originalTrackNumber>x</upnp:originalTrackNumber><upnp:genre></upnp:genre></item></DIDL-Lite>"#,
        );
        let metadata = compile(&["artist", "year", "track", "genre"], &item);
        assert_eq!(metadata.get("artist").and_then(|v| v.as_str()), Some("A"));
        assert_eq!(metadata.get("year").and_then(|v| v.as_int()), Some(2008));
        assert!(!metadata.contains_key("track"));
        assert!(!metadata.contains_key("genre"));
    }

    #[test]
    fn test_generic_lookup_falls_back_to_resource_attributes() {
        let item = parse(&item_xml(
            "object.item.audioItem",
            r#"<res protocolInfo="http-get:*:audio/mpeg:*">http://h/a.mp3</res>"#,
        ));
        let metadata = compile(&["protocol-info"], &item);
        assert_eq!(
            metadata.get("protocol-info").and_then(|v| v.as_str()),
            Some("http-get:*:audio/mpeg:*")
        );
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case(" -7 ", Some(-7))]
    #[case("+3", Some(3))]
    #[case("2008-05-01", Some(2008))]
    #[case("x1", None)]
    #[case("-", None)]
    #[case("", None)]
    fn test_leading_integer(#[case] raw: &str, #[case] expected: Option<i64>) {
        assert_eq!(leading_integer(raw), expected);
    }

    #[test]
    fn test_metadata_serializes_as_map() {
        let mut metadata = Metadata::new();
        metadata.add("title", MetadataValue::Str("T".to_string()));
        metadata.add("duration", MetadataValue::Int(5));
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({"duration": [5], "title": ["T"]}));
    }
}
