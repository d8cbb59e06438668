//! Canonical CBOR encoding of commit identities.
//!
//! The fingerprint of a commit must be identical on every platform, so the
//! identity is encoded by hand: definite lengths only, smallest integer
//! headers, text strings only. Id order is significant.
//!
//! Layout: `[type, [id, ...], action]`

use crate::commit::CommitAction;
use crate::types::Fingerprint;

/// Domain separation for fingerprint hashing.
const FINGERPRINT_CONTEXT: &str = "syncbridge 2024 commit fingerprint v1";

/// Encode a commit identity to canonical CBOR bytes.
pub fn canonical_identity_bytes(object_type: &str, ids: &[String], action: CommitAction) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + ids.iter().map(|id| id.len() + 2).sum::<usize>());
    encode_uint(&mut buf, 4, 3);
    encode_text(&mut buf, object_type);
    encode_uint(&mut buf, 4, ids.len() as u64);
    for id in ids {
        encode_text(&mut buf, id);
    }
    encode_text(&mut buf, action.as_str());
    buf
}

/// Fingerprint of a commit identity.
pub fn fingerprint(object_type: &str, ids: &[String], action: CommitAction) -> Fingerprint {
    let mut hasher = blake3::Hasher::new_derive_key(FINGERPRINT_CONTEXT);
    hasher.update(&canonical_identity_bytes(object_type, ids, action));
    hasher.finalize().into()
}

/// Encode a major type header with its argument.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}
