//! The Hello payload (spec.md §6 "Wire — Hello payload"), carried inside
//! the Noise handshake itself: the responder's Hello rides in message 2's
//! payload, the initiator's in message 3's (spec.md §4.3's `payload`
//! arguments to `process_message1`/`process_message2`). Once the Noise
//! session reaches Transport both sides have already exchanged Hello, so
//! the coordinator runs [`crate::hello::decide_hello`] immediately after
//! the handshake completes rather than waiting for a further frame.

use serde::{Deserialize, Serialize};

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireHello {
    id: String,
    ws: String,
    name: String,
    port: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelloPayload {
    pub device_id: Id,
    pub workspace_id: Id,
    pub device_name: String,
    pub port: u16,
}

pub fn encode_hello(hello: &HelloPayload) -> Vec<u8> {
    let wire = WireHello {
        id: hello.device_id.to_string(),
        ws: hello.workspace_id.to_string(),
        name: hello.device_name.clone(),
        port: hello.port as u32,
    };
    serde_json::to_vec(&wire).expect("HelloPayload always serializes")
}

pub fn decode_hello(data: &[u8]) -> Result<HelloPayload> {
    let wire: WireHello = serde_json::from_slice(data).map_err(|e| Error::bad_input(format!("malformed Hello payload: {e}")))?;
    if wire.port == 0 || wire.port > 65535 {
        return Err(Error::bad_input(format!("Hello port {} out of range", wire.port)));
    }
    Ok(HelloPayload {
        device_id: wire.id.parse()?,
        workspace_id: wire.ws.parse()?,
        device_name: wire.name,
        port: wire.port as u16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let hello = HelloPayload {
            device_id: Id::new(),
            workspace_id: Id::new(),
            device_name: "kitchen tablet".into(),
            port: 47001,
        };
        let encoded = encode_hello(&hello);
        assert_eq!(decode_hello(&encoded).unwrap(), hello);
    }

    #[test]
    fn bootstrap_hello_carries_nil_workspace() {
        let hello = HelloPayload {
            device_id: Id::new(),
            workspace_id: Id::nil(),
            device_name: "new phone".into(),
            port: 1,
        };
        let decoded = decode_hello(&encode_hello(&hello)).unwrap();
        assert!(decoded.workspace_id.is_nil());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode_hello(b"not json").is_err());
    }

    #[test]
    fn rejects_out_of_range_port() {
        let bad = serde_json::json!({ "id": Id::new().to_string(), "ws": Id::new().to_string(), "name": "x", "port": 70000 });
        assert!(decode_hello(&serde_json::to_vec(&bad).unwrap()).is_err());
    }
}
