//! Object ids and source uuids
//!
//! Objects are addressed as `<uuid>::<item id>`, where `<uuid>` identifies the
//! source and `<item id>` is the server's own object id. The uuid is derived
//! from the device UDN with a reversible escaping that only produces
//! alphanumerics and `_`, so it can never contain the separator.

use crate::error::{CdsError, Result};

/// Separator between the source uuid and the remote item id
pub const SEPARATOR: &str = "::";

/// Remote id of the ContentDirectory root container
pub const ROOT_CONTAINER_ID: &str = "0";

/// Build an object id from a source uuid and a remote item id
pub fn encode(uuid: &str, item_id: &str) -> String {
    format!("{}{}{}", uuid, SEPARATOR, item_id)
}

/// Split an object id at the first separator.
///
/// The item id may be empty, meaning the root container.
pub fn decode(object_id: &str) -> Result<(&str, &str)> {
    match object_id.split_once(SEPARATOR) {
        Some((uuid, item_id)) if !uuid.is_empty() => Ok((uuid, item_id)),
        _ => Err(CdsError::InvalidObjectId(object_id.to_string())),
    }
}

/// Remote id to send to the server for a decoded item id
pub fn remote_item_id(item_id: &str) -> &str {
    if item_id.is_empty() {
        ROOT_CONTAINER_ID
    } else {
        item_id
    }
}

/// Escape raw bytes: `_` prefix, ASCII alphanumerics kept, everything else
/// written as `_HH`.
pub fn escape_udn(raw: &[u8]) -> String {
    let mut escaped = String::with_capacity(raw.len() * 2 + 1);
    escaped.push('_');
    for &byte in raw {
        if byte.is_ascii_alphanumeric() {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{:02X}", byte));
        }
    }
    escaped
}

/// Reverse [`escape_udn`]
pub fn unescape_udn(escaped: &str) -> Result<Vec<u8>> {
    let invalid = || CdsError::InvalidObjectId(escaped.to_string());

    let body = escaped.strip_prefix('_').ok_or_else(invalid)?.as_bytes();
    let mut raw = Vec::with_capacity(body.len());
    let mut index = 0;
    while index < body.len() {
        let byte = body[index];
        if byte == b'_' {
            let (hi, lo) = match body.get(index + 1..index + 3) {
                Some(&[hi, lo]) => (hex(hi).ok_or_else(invalid)?, hex(lo).ok_or_else(invalid)?),
                _ => return Err(invalid()),
            };
            raw.push((hi << 4) | lo);
            index += 3;
        } else if byte.is_ascii_alphanumeric() {
            raw.push(byte);
            index += 1;
        } else {
            return Err(invalid());
        }
    }
    Ok(raw)
}

fn hex(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Source uuid for a device UDN
pub fn udn_to_uuid(udn: &str) -> String {
    escape_udn(udn.as_bytes())
}

/// Device UDN for a source uuid
pub fn uuid_to_udn(uuid: &str) -> Result<String> {
    String::from_utf8(unescape_udn(uuid)?).map_err(|_| CdsError::InvalidObjectId(uuid.to_string()))
}

/// Object ids of the containers named in a `ContainerUpdateIDs` event value.
///
/// The value alternates container ids and update counters:
/// `id,updateId,id,updateId,...`.
pub fn container_update_object_ids(uuid: &str, value: &str) -> Vec<String> {
    value
        .split(',')
        .step_by(2)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| encode(uuid, id))
        .collect()
}
