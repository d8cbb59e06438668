//! Versioned record format of the waiting queue.
//!
//! ```text
//! "SBWQ" | version: u8 | record*
//! record = len: u32 LE | checksum: [u8; 8] | CBOR(CommitEvent)
//! ```
//!
//! `checksum` is the first 8 bytes of the Blake3 hash of the CBOR payload.
//! A truncated trailing record is dropped; a record whose checksum or payload
//! does not verify is skipped. Earlier records always survive.

use syncbridge_core::CommitEvent;

use crate::error::{Result, StoreError};

/// File magic.
pub const MAGIC: &[u8; 4] = b"SBWQ";

/// Current record format version.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1;
const CHECKSUM_LEN: usize = 8;
const RECORD_PREFIX_LEN: usize = 4 + CHECKSUM_LEN;

/// Events read back from a record file.
#[derive(Debug, Default)]
pub struct DecodedRecords {
    pub events: Vec<CommitEvent>,
    /// Records that were truncated or failed verification.
    pub dropped: usize,
}

/// True if `bytes` starts with the record file magic.
pub fn is_record_file(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = blake3::hash(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    out
}

/// Encode events into a complete record file.
pub fn encode_records<'a>(events: impl IntoIterator<Item = &'a CommitEvent>) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);

    for event in events {
        let mut payload = Vec::new();
        ciborium::into_writer(event, &mut payload)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("record too large".into()))?;

        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&checksum(&payload));
        buf.extend_from_slice(&payload);
    }

    Ok(buf)
}

/// Decode a record file.
///
/// Fails only when the header is missing or names an unknown version.
pub fn decode_records(bytes: &[u8]) -> Result<DecodedRecords> {
    if bytes.len() < HEADER_LEN || !is_record_file(bytes) {
        return Err(StoreError::InvalidData("missing record file header".into()));
    }
    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(StoreError::Migration(format!(
            "unsupported record format version: {}",
            version
        )));
    }

    let mut out = DecodedRecords::default();
    let mut rest = &bytes[HEADER_LEN..];

    while !rest.is_empty() {
        if rest.len() < RECORD_PREFIX_LEN {
            out.dropped += 1;
            break;
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&rest[..4]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let expected = &rest[4..RECORD_PREFIX_LEN];
        let body = &rest[RECORD_PREFIX_LEN..];

        if body.len() < len {
            out.dropped += 1;
            break;
        }
        let payload = &body[..len];
        rest = &body[len..];

        if checksum(payload) != expected {
            out.dropped += 1;
            continue;
        }
        match ciborium::from_reader::<CommitEvent, _>(payload) {
            Ok(event) if event.has_valid_fingerprint() => out.events.push(event),
            Ok(_) | Err(_) => out.dropped += 1,
        }
    }

    Ok(out)
}
