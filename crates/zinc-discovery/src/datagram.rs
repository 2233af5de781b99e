//! The discovery presence beacon: a small JSON datagram advertising a
//! device's endpoint and workspace (spec.md §6 "Wire — Discovery datagram").
//!
//! Grounded in `examples/original_source/src/network/discovery_datagram.cpp`,
//! translated from `QByteArray`/`QJsonDocument` to `serde_json`.

use std::net::IpAddr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use zinc_core::error::{Error, Result};
use zinc_core::ids::{Id, Timestamp};

pub const DATAGRAM_TYPE: &str = "zinc-sync";
pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_DATAGRAM_LEN: usize = 64 * 1024;

/// On-wire shape, matching spec.md's field names exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireDatagram {
    t: String,
    v: u32,
    id: String,
    ws: String,
    name: String,
    port: u32,
    pk: String,
    ts: Timestamp,
}

/// The information one device advertises about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    pub device_id: Id,
    pub workspace_id: Id,
    pub device_name: String,
    pub port: u16,
    pub fingerprint: [u8; 8],
}

/// A peer learned from a received, validated datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub device_id: Id,
    pub workspace_id: Id,
    pub device_name: String,
    pub host: IpAddr,
    pub port: u16,
    pub fingerprint: [u8; 8],
    pub last_seen: Timestamp,
}

/// Serialize a presence beacon for `info`, stamped with the current time.
pub fn encode_datagram(info: &ServiceInfo, ts: Timestamp) -> Vec<u8> {
    let wire = WireDatagram {
        t: DATAGRAM_TYPE.to_string(),
        v: PROTOCOL_VERSION,
        id: info.device_id.to_string(),
        ws: info.workspace_id.to_string(),
        name: info.device_name.clone(),
        port: info.port as u32,
        pk: BASE64.encode(info.fingerprint),
        ts,
    };
    serde_json::to_vec(&wire).expect("ServiceInfo always serializes")
}

/// Parse and validate a received datagram. Per spec.md §4.5: non-JSON,
/// wrong `type`, missing required fields, unparsable UUIDs, or
/// out-of-range `port` are silently dropped by the caller — here they
/// surface as `Err(BadInput)` so the caller can decide to drop silently
/// (production) or log (debug builds with `ZINC_DEBUG_SYNC`).
pub fn decode_datagram(datagram: &[u8], sender_host: IpAddr) -> Result<PeerInfo> {
    if datagram.len() > MAX_DATAGRAM_LEN {
        return Err(Error::bad_input(format!(
            "discovery datagram {} bytes exceeds max {MAX_DATAGRAM_LEN}",
            datagram.len()
        )));
    }
    let wire: WireDatagram =
        serde_json::from_slice(datagram).map_err(|e| Error::bad_input(format!("malformed discovery datagram: {e}")))?;

    if wire.t != DATAGRAM_TYPE {
        return Err(Error::bad_input(format!("unexpected datagram type {:?}", wire.t)));
    }
    if wire.port == 0 || wire.port > 65535 {
        return Err(Error::bad_input(format!("port {} out of range", wire.port)));
    }
    let device_id: Id = wire.id.parse()?;
    let workspace_id: Id = wire.ws.parse()?;

    let fingerprint_bytes = BASE64
        .decode(&wire.pk)
        .map_err(|e| Error::bad_input(format!("invalid base64 fingerprint: {e}")))?;
    if fingerprint_bytes.len() != 8 {
        return Err(Error::bad_input(format!(
            "fingerprint must be 8 bytes, got {}",
            fingerprint_bytes.len()
        )));
    }
    let mut fingerprint = [0u8; 8];
    fingerprint.copy_from_slice(&fingerprint_bytes);

    Ok(PeerInfo {
        device_id,
        workspace_id,
        device_name: wire.name,
        host: sender_host,
        port: wire.port as u16,
        fingerprint,
        last_seen: wire.ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_service() -> ServiceInfo {
        ServiceInfo {
            device_id: Id::new(),
            workspace_id: Id::new(),
            device_name: "kitchen tablet".into(),
            port: 47000,
            fingerprint: [1, 2, 3, 4, 5, 6, 7, 8],
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let info = sample_service();
        let sender = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42));
        let encoded = encode_datagram(&info, 1_700_000_000_000);
        let decoded = decode_datagram(&encoded, sender).unwrap();

        assert_eq!(decoded.device_id, info.device_id);
        assert_eq!(decoded.workspace_id, info.workspace_id);
        assert_eq!(decoded.device_name, info.device_name);
        assert_eq!(decoded.port, info.port);
        assert_eq!(decoded.fingerprint, info.fingerprint);
        assert_eq!(decoded.host, sender);
    }

    #[test]
    fn non_json_is_rejected() {
        let sender = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(decode_datagram(b"not json at all", sender).is_err());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let sender = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let bad = serde_json::json!({
            "t": "something-else", "v": 1, "id": Id::new().to_string(),
            "ws": Id::new().to_string(), "name": "x", "port": 1234, "pk": "AAAAAAAAAAA=", "ts": 0
        });
        assert!(decode_datagram(&serde_json::to_vec(&bad).unwrap(), sender).is_err());
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        let sender = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let bad = serde_json::json!({
            "t": DATAGRAM_TYPE, "v": 1, "id": Id::new().to_string(),
            "ws": Id::new().to_string(), "name": "x", "port": 70000, "pk": "AAAAAAAAAAA=", "ts": 0
        });
        assert!(decode_datagram(&serde_json::to_vec(&bad).unwrap(), sender).is_err());
    }

    #[test]
    fn unparsable_uuid_is_rejected() {
        let sender = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let bad = serde_json::json!({
            "t": DATAGRAM_TYPE, "v": 1, "id": "not-a-uuid",
            "ws": Id::new().to_string(), "name": "x", "port": 1234, "pk": "AAAAAAAAAAA=", "ts": 0
        });
        assert!(decode_datagram(&serde_json::to_vec(&bad).unwrap(), sender).is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let sender = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let bad = serde_json::json!({ "t": DATAGRAM_TYPE, "v": 1 });
        assert!(decode_datagram(&serde_json::to_vec(&bad).unwrap(), sender).is_err());
    }
}
