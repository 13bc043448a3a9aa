//! `protocolInfo` strings of DIDL-Lite resources
//!
//! A protocolInfo value has four colon separated fields:
//! `<protocol>:<network>:<contentFormat>:<additionalInfo>`, for example
//! `http-get:*:audio/mpeg:DLNA.ORG_PN=MP3;DLNA.ORG_OP=01`.

use serde::Serialize;

const DLNA_OP_MARKER: &str = "DLNA.ORG_OP=";

/// The four fields of a resource's protocolInfo attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolInfo {
    pub protocol: String,
    pub network: String,
    pub content_format: String,
    /// Everything after the third colon, colons included
    pub additional_info: String,
}

/// Seek capabilities declared by the `DLNA.ORG_OP=ab` flag pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DlnaOperation {
    /// `a`: seeking by time position
    pub time_seek: bool,
    /// `b`: seeking by byte range
    pub range: bool,
}

impl ProtocolInfo {
    /// Split a protocolInfo string. Returns `None` when fewer than four fields
    /// are present.
    pub fn parse(value: &str) -> Option<Self> {
        let mut fields = value.splitn(4, ':');
        let protocol = fields.next()?;
        let network = fields.next()?;
        let content_format = fields.next()?;
        let additional_info = fields.next()?;

        Some(Self {
            protocol: protocol.trim().to_string(),
            network: network.trim().to_string(),
            content_format: content_format.trim().to_string(),
            additional_info: additional_info.trim().to_string(),
        })
    }

    /// Field by position, 0 to 3
    pub fn field(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(&self.protocol),
            1 => Some(&self.network),
            2 => Some(&self.content_format),
            3 => Some(&self.additional_info),
            _ => None,
        }
    }

    /// Read the `DLNA.ORG_OP` flags from the additional info field.
    ///
    /// Each flag is true only when its character is `1`. Returns `None` when
    /// the marker is absent or not followed by two flag characters.
    pub fn dlna_operation(&self) -> Option<DlnaOperation> {
        if self.additional_info == "*" {
            return None;
        }
        let start = self.additional_info.find(DLNA_OP_MARKER)? + DLNA_OP_MARKER.len();
        let flags = self.additional_info.as_bytes().get(start..start + 2)?;
        Some(DlnaOperation {
            time_seek: flags[0] == b'1',
            range: flags[1] == b'1',
        })
    }
}

impl std::fmt::Display for ProtocolInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.protocol, self.network, self.content_format, self.additional_info
        )
    }
}
