//! Payload encodings that aren't plain JSON (spec.md §6).
//!
//! `SyncResponse`/`ChangeNotify` share a wire shape:
//! `[4 bytes BE doc_id_len] [doc_id utf8] [opaque CRDT bytes]`.

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;

/// Encode a `(doc_id, changes)` pair into the SyncResponse/ChangeNotify
/// wire shape.
pub fn encode_doc_payload(doc_id: &Id, changes: &[u8]) -> Vec<u8> {
    let doc_id_str = doc_id.to_string();
    let doc_id_bytes = doc_id_str.as_bytes();
    let mut out = Vec::with_capacity(4 + doc_id_bytes.len() + changes.len());
    out.extend_from_slice(&(doc_id_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(doc_id_bytes);
    out.extend_from_slice(changes);
    out
}

/// Decode a buffer produced by [`encode_doc_payload`], returning the
/// document id and the remaining opaque change bytes.
pub fn decode_doc_payload(data: &[u8]) -> Result<(Id, Vec<u8>)> {
    if data.len() < 4 {
        return Err(Error::protocol_error("doc payload shorter than length prefix"));
    }
    let doc_id_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let rest = &data[4..];
    if rest.len() < doc_id_len {
        return Err(Error::protocol_error("doc payload declares more id bytes than present"));
    }
    let (doc_id_bytes, changes) = rest.split_at(doc_id_len);
    let doc_id_str = std::str::from_utf8(doc_id_bytes)
        .map_err(|e| Error::protocol_error(format!("doc id is not utf8: {e}")))?;
    let doc_id: Id = doc_id_str.parse()?;
    Ok((doc_id, changes.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let doc_id = Id::new();
        let encoded = encode_doc_payload(&doc_id, b"crdt change bytes");
        let (decoded_id, changes) = decode_doc_payload(&encoded).unwrap();
        assert_eq!(decoded_id, doc_id);
        assert_eq!(changes, b"crdt change bytes");
    }

    #[test]
    fn rejects_truncated_prefix() {
        assert!(decode_doc_payload(&[0, 0]).is_err());
    }

    #[test]
    fn rejects_declared_length_past_buffer_end() {
        let mut bad = (100u32).to_be_bytes().to_vec();
        bad.extend_from_slice(b"short");
        assert!(decode_doc_payload(&bad).is_err());
    }
}
