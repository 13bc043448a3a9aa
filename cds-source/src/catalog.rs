//! Metadata key catalog
//!
//! Every metadata key the source understands is declared once in the table
//! below, together with the token used in a ContentDirectory `Filter`
//! argument, the DIDL-Lite property or `res` attribute holding its value, and
//! the type the value is reported as.
//!
//! Requested keys are collected into a [`KeySet`]. The wildcard [`ALL_KEYS`]
//! selects every key and names that are not in the catalog are ignored, so a
//! host may freely ask for keys another source provides.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Key name that selects every key in the catalog
pub const ALL_KEYS: &str = "*";

/// Filter token of the composite `res@protocolInfo` attribute
pub const PROTOCOL_INFO_TOKEN: &str = "res@protocolInfo";

/// How a key's value is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueType {
    String,
    Int,
    Bool,
}

/// One row of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    pub key: MetadataKey,
    /// Name used by hosts, e.g. `album-art-small-uri`
    pub name: &'static str,
    /// Token for the `Filter` argument; `None` for keys computed locally
    pub filter_token: Option<&'static str>,
    /// Local name of the DIDL-Lite property or `res` attribute carrying the value
    pub property: Option<&'static str>,
    pub value_type: ValueType,
}

/// Declares [`MetadataKey`] and the catalog table from one list, so the enum
/// discriminant always indexes its own row.
macro_rules! define_metadata_keys {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $name:literal, $filter:expr, $property:expr, $value_type:ident;
        )+
    ) => {
        /// A metadata key known to the catalog, in catalog order
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub enum MetadataKey {
            $(
                $(#[$meta])*
                $variant,
            )+
        }

        static CATALOG: &[KeyEntry] = &[
            $(
                KeyEntry {
                    key: MetadataKey::$variant,
                    name: $name,
                    filter_token: $filter,
                    property: $property,
                    value_type: ValueType::$value_type,
                },
            )+
        ];
    };
}

define_metadata_keys! {
    Uri => "uri", Some("res"), None, String;
    MimeType => "mime-type", Some(PROTOCOL_INFO_TOKEN), None, String;
    Title => "title", Some("dc:title"), Some("title"), String;
    Duration => "duration", Some("res@duration"), Some("duration"), Int;
    Artist => "artist", Some("upnp:artist"), Some("artist"), String;
    Album => "album", Some("upnp:album"), Some("album"), String;
    Genre => "genre", Some("upnp:genre"), Some("genre"), String;
    Track => "track", Some("upnp:originalTrackNumber"), Some("originalTrackNumber"), Int;
    Year => "year", Some("dc:date"), Some("date"), Int;
    Description => "description", Some("dc:description"), Some("description"), String;
    Composer => "composer", Some("upnp:author"), Some("author"), String;
    Copyright => "copyright", Some("dc:rights"), Some("rights"), String;
    Rating => "rating", Some("upnp:rating"), Some("rating"), String;
    Bitrate => "bitrate", Some("res@bitrate"), Some("bitrate"), Int;
    AudioBitrate => "audio-bitrate", Some("res@bitrate"), Some("bitrate"), Int;
    VideoBitrate => "video-bitrate", Some("res@bitrate"), Some("bitrate"), Int;
    Filesize => "filesize", Some("res@size"), Some("size"), Int;
    /// Colour depth of image resources
    Bpp => "bpp", Some("res@colorDepth"), Some("colorDepth"), Int;
    ResX => "res-x", Some("res@resolution"), Some("resolution"), Int;
    ResY => "res-y", Some("res@resolution"), Some("resolution"), Int;
    ProtocolInfo => "protocol-info", Some(PROTOCOL_INFO_TOKEN), Some("protocolInfo"), String;
    ThumbnailUri => "thumbnail-uri", Some("upnp:albumArtURI"), None, String;
    AlbumArtSmallUri => "album-art-small-uri", Some("upnp:albumArtURI"), Some("albumArtURI"), String;
    AlbumArtMediumUri => "album-art-medium-uri", Some("upnp:albumArtURI"), Some("albumArtURI"), String;
    AlbumArtLargeUri => "album-art-large-uri", Some("upnp:albumArtURI"), Some("albumArtURI"), String;
    AlbumArtUri => "album-art-uri", Some("upnp:albumArtURI"), Some("albumArtURI"), String;
    LyricsUri => "lyrics-uri", Some("upnp:lyricsURI"), Some("lyricsURI"), String;
    ArtistInfoUri => "artist-info-uri", Some("upnp:artistDiscographyURI"), Some("artistDiscographyURI"), String;
    IsSeekable => "is-seekable", Some(PROTOCOL_INFO_TOKEN), None, Bool;
    ChildCount => "childcount", Some("@childCount"), None, Int;
    /// Raw DIDL-Lite document of a metadata request
    Didl => "didl", None, None, String;
}

impl MetadataKey {
    /// Catalog row of this key
    pub fn entry(self) -> &'static KeyEntry {
        resolve_key(self)
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All catalog rows, in catalog order
pub fn entries() -> &'static [KeyEntry] {
    CATALOG
}

/// Look a key up by its host-facing name
pub fn resolve(name: &str) -> Option<&'static KeyEntry> {
    CATALOG.iter().find(|entry| entry.name == name)
}

/// Catalog row of a key
pub fn resolve_key(key: MetadataKey) -> &'static KeyEntry {
    &CATALOG[key as usize]
}

/// Protocol token for a key name used in filters and sort criteria.
///
/// Names outside the catalog, or without a token, are used verbatim so hosts
/// can address raw DIDL-Lite properties such as `upnp:class`.
pub fn filter_token(name: &str) -> &str {
    resolve(name)
        .and_then(|entry| entry.filter_token)
        .unwrap_or(name)
}

/// An ordered set of requested metadata keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: BTreeSet<MetadataKey>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key in the catalog
    pub fn all() -> Self {
        CATALOG.iter().map(|entry| entry.key).collect()
    }

    /// Build a key set from host key names.
    ///
    /// [`ALL_KEYS`] anywhere in the list selects every key. Unknown names are
    /// skipped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            let name = name.as_ref();
            if name == ALL_KEYS {
                return Self::all();
            }
            if let Some(entry) = resolve(name) {
                set.insert(entry.key);
            }
        }
        set
    }

    pub fn insert(&mut self, key: MetadataKey) -> bool {
        self.keys.insert(key)
    }

    /// Remove `key`, returning whether it was present
    pub fn remove(&mut self, key: MetadataKey) -> bool {
        self.keys.remove(&key)
    }

    pub fn contains(&self, key: MetadataKey) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = MetadataKey> + '_ {
        self.keys.iter().copied()
    }

    /// Comma separated `Filter` argument for these keys.
    ///
    /// Tokens appear in catalog order and each token only once, however many
    /// keys share it.
    pub fn filter_string(&self) -> String {
        let mut tokens: Vec<&'static str> = Vec::new();
        for key in self.iter() {
            if let Some(token) = key.entry().filter_token {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        tokens.join(",")
    }
}

impl FromIterator<MetadataKey> for KeySet {
    fn from_iter<T: IntoIterator<Item = MetadataKey>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

impl Extend<MetadataKey> for KeySet {
    fn extend<T: IntoIterator<Item = MetadataKey>>(&mut self, iter: T) {
        self.keys.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_catalog_rows_match_their_keys() {
        for (index, entry) in entries().iter().enumerate() {
            assert_eq!(entry.key as usize, index, "row {} is out of order", entry.name);
            assert_eq!(resolve_key(entry.key), entry);
            assert_eq!(resolve(entry.name), Some(entry));
        }
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let names: BTreeSet<_> = entries().iter().map(|e| e.name).collect();
        assert_eq!(names.len(), entries().len());
    }

    #[test]
    fn test_resolve_unknown_name() {
        assert!(resolve("no-such-key").is_none());
        assert!(resolve(ALL_KEYS).is_none());
    }

    #[test]
    fn test_filter_token_translation() {
        assert_eq!(filter_token("title"), "dc:title");
        assert_eq!(filter_token("mime-type"), "res@protocolInfo");
        assert_eq!(filter_token("upnp:class"), "upnp:class");
        assert_eq!(filter_token("didl"), "didl");
    }

    #[test]
    fn test_from_names_ignores_unknown() {
        let set = KeySet::from_names(["title", "bogus", "artist"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(MetadataKey::Title));
        assert!(set.contains(MetadataKey::Artist));
    }

    #[test]
    fn test_wildcard_selects_everything() {
        assert_eq!(KeySet::from_names(["title", ALL_KEYS]), KeySet::all());
        assert_eq!(KeySet::all().len(), entries().len());
    }

    #[test]
    fn test_filter_string_dedups_album_art() {
        let set = KeySet::from_names([
            "album-art-small-uri",
            "album-art-medium-uri",
            "album-art-large-uri",
            "title",
        ]);
        assert_eq!(set.filter_string(), "dc:title,upnp:albumArtURI");
    }

    #[test]
    fn test_filter_string_skips_local_keys() {
        let set = KeySet::from_names(["didl"]);
        assert_eq!(set.filter_string(), "");

        let set = KeySet::from_names(["uri", "mime-type", "is-seekable", "protocol-info"]);
        assert_eq!(set.filter_string(), "res,res@protocolInfo");
    }

    #[test]
    fn test_remove_reports_presence() {
        let mut set = KeySet::from_names(["title"]);
        assert!(set.remove(MetadataKey::Title));
        assert!(!set.remove(MetadataKey::Title));
        assert!(set.is_empty());
    }

    fn key_name() -> impl Strategy<Value = String> {
        prop_oneof![
            proptest::sample::select(entries().iter().map(|e| e.name).collect::<Vec<_>>())
                .prop_map(|name| name.to_string()),
            "[a-z-]{1,12}",
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_filter_string_has_no_duplicates(names in proptest::collection::vec(key_name(), 0..20)) {
            let filter = KeySet::from_names(&names).filter_string();
            let tokens: Vec<&str> = filter.split(',').filter(|t| !t.is_empty()).collect();
            let unique: BTreeSet<&str> = tokens.iter().copied().collect();
            prop_assert_eq!(tokens.len(), unique.len());
        }

        #[test]
        fn prop_wildcard_wins(names in proptest::collection::vec(key_name(), 0..10), position in 0usize..10) {
            let mut names = names;
            let at = position.min(names.len());
            names.insert(at, ALL_KEYS.to_string());
            prop_assert_eq!(KeySet::from_names(&names), KeySet::all());
        }
    }
}
