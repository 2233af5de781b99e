//! The coordinator's own framing inside the `SyncResponse`/`ChangeNotify`
//! "opaque CRDT bytes" field (spec.md §6). The wire format there only
//! length-prefixes a `doc_id`; spec.md §4.7 still requires the receiver to
//! "decode, persist each change (uniqueness by `(doc, actor, seq)`)", which
//! means `actor_id`/`seq_num` must travel inside that opaque region. This
//! module defines that inner envelope: a length-prefixed list of
//! `(actor_id, seq_num, change_bytes)` tuples, following the same
//! length-prefix convention `zinc_transport::wire` uses for `doc_id`.

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;
use zinc_storage::crdt::CrdtChangeRow;

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEnvelope {
    pub doc_id: Id,
    pub actor_id: Id,
    pub seq_num: i64,
    pub change_bytes: Vec<u8>,
}

impl ChangeEnvelope {
    pub fn from_row(doc_id: Id, row: &CrdtChangeRow) -> Self {
        ChangeEnvelope {
            doc_id,
            actor_id: row.actor_id,
            seq_num: row.seq_num,
            change_bytes: row.change_bytes.clone(),
        }
    }
}

/// Encode a batch of changes for one document, all sharing `doc_id`
/// (callers are expected to group by document before calling this).
pub fn encode_change_batch(changes: &[ChangeEnvelope]) -> Vec<u8> {
    let mut out = Vec::new();
    for change in changes {
        let actor_bytes = change.actor_id.to_string().into_bytes();
        out.extend_from_slice(&(actor_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&actor_bytes);
        out.extend_from_slice(&change.seq_num.to_be_bytes());
        out.extend_from_slice(&(change.change_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&change.change_bytes);
    }
    out
}

/// Decode a batch produced by [`encode_change_batch`]; `doc_id` is filled
/// in from the outer `SyncResponse`/`ChangeNotify` envelope since the
/// inner records don't repeat it.
pub fn decode_change_batch(doc_id: Id, mut data: &[u8]) -> Result<Vec<ChangeEnvelope>> {
    let mut changes = Vec::new();
    while !data.is_empty() {
        if data.len() < 4 {
            return Err(Error::protocol_error("change batch truncated before actor length"));
        }
        let actor_len = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
        data = &data[4..];
        if data.len() < actor_len + 8 + 4 {
            return Err(Error::protocol_error("change batch truncated in record header"));
        }
        let actor_id: Id = std::str::from_utf8(&data[..actor_len])
            .map_err(|e| Error::protocol_error(format!("actor id is not utf8: {e}")))?
            .parse()?;
        data = &data[actor_len..];
        let seq_num = i64::from_be_bytes(data[..8].try_into().unwrap());
        data = &data[8..];
        let change_len = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
        data = &data[4..];
        if data.len() < change_len {
            return Err(Error::protocol_error("change batch truncated in change bytes"));
        }
        let change_bytes = data[..change_len].to_vec();
        data = &data[change_len..];
        changes.push(ChangeEnvelope { doc_id, actor_id, seq_num, change_bytes });
    }
    Ok(changes)
}

/// `ChangeAck` payload (spec.md §4.4): the acknowledged row ids, packed as
/// 8-byte big-endian integers.
pub fn encode_row_ids(row_ids: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(row_ids.len() * 8);
    for id in row_ids {
        out.extend_from_slice(&id.to_be_bytes());
    }
    out
}

pub fn decode_row_ids(data: &[u8]) -> Result<Vec<i64>> {
    if data.len() % 8 != 0 {
        return Err(Error::protocol_error("ChangeAck payload not a multiple of 8 bytes"));
    }
    Ok(data.chunks_exact(8).map(|c| i64::from_be_bytes(c.try_into().unwrap())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_batch_round_trips() {
        let doc_id = Id::new();
        let changes = vec![
            ChangeEnvelope { doc_id, actor_id: Id::new(), seq_num: 1, change_bytes: b"op1".to_vec() },
            ChangeEnvelope { doc_id, actor_id: Id::new(), seq_num: 2, change_bytes: b"op2-longer".to_vec() },
        ];
        let encoded = encode_change_batch(&changes);
        let decoded = decode_change_batch(doc_id, &encoded).unwrap();
        assert_eq!(decoded, changes);
    }

    #[test]
    fn empty_batch_round_trips() {
        let doc_id = Id::new();
        assert_eq!(decode_change_batch(doc_id, &encode_change_batch(&[])).unwrap(), vec![]);
    }

    #[test]
    fn truncated_batch_is_protocol_error() {
        let doc_id = Id::new();
        assert!(decode_change_batch(doc_id, &[0, 0, 0, 99]).is_err());
    }

    #[test]
    fn row_ids_round_trip() {
        let ids = vec![1i64, 2, 1_000_000_000];
        assert_eq!(decode_row_ids(&encode_row_ids(&ids)).unwrap(), ids);
    }

    #[test]
    fn row_ids_reject_misaligned_length() {
        assert!(decode_row_ids(&[0, 1, 2]).is_err());
    }
}
