//! The `Presence` application frame (spec.md §4.4, code `0x41`): an opaque
//! JSON blob devices exchange after Hello to announce liveness/status,
//! distinct from the discovery beacon (`zinc_discovery`) which announces
//! endpoints on the LAN before a connection exists.

use serde::{Deserialize, Serialize};

use zinc_core::error::{Error, Result};
use zinc_core::ids::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub status: String,
    pub updated_at: Timestamp,
}

pub fn encode_presence(presence: &PresencePayload) -> Vec<u8> {
    serde_json::to_vec(presence).expect("PresencePayload always serializes")
}

pub fn decode_presence(data: &[u8]) -> Result<PresencePayload> {
    serde_json::from_slice(data).map_err(|e| Error::bad_input(format!("malformed Presence payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let presence = PresencePayload { status: "active".into(), updated_at: 1_700_000_000_000 };
        assert_eq!(decode_presence(&encode_presence(&presence)).unwrap(), presence);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode_presence(b"{").is_err());
    }
}
