//! Device pairing (spec.md §4.8), grounded in
//! `examples/original_source/src/network/pairing.hpp`/`.cpp`: three ways to
//! establish a shared workspace id between two devices that have never
//! talked before, run as a small state machine independent of the
//! transport connection the actual sync then rides over.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;
use zinc_crypto::keys::generate_pairing_code;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMethod {
    QrCode,
    NumericCode,
    Passphrase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    WaitingForPeer,
    Connecting,
    Verifying,
    Exchanging,
    Complete,
    Failed,
}

/// What pairing hands back once it settles on a workspace to join. For
/// `NumericCode`/`Passphrase` only `workspace_id` is meaningful — the peer
/// itself is found afterwards by discovery; for `QrCode` the full peer
/// endpoint travelled in the scanned payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedWorkspace {
    pub workspace_id: Id,
    pub peer: Option<QrPeerInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QrPeerInfo {
    pub device_id: Id,
    pub device_name: String,
    pub public_key: [u8; 32],
    pub address: String,
    pub port: u16,
}

/// A running pairing attempt. Initiator side generates a code/QR and waits;
/// responder side submits whatever the user entered or scanned.
pub struct PairingSession {
    state: PairingState,
    method: PairingMethod,
    verification_code: String,
}

impl PairingSession {
    /// Start as the device displaying a code or QR for the other side to
    /// use (spec.md §4.8 "initiator"). `NumericCode`/`Passphrase` derive
    /// `workspace_id` immediately from the generated/given secret so both
    /// sides converge without any round trip; `QrCode` defers to
    /// [`Self::submit_qr_payload`] on the scanning side instead.
    pub fn start_as_initiator(method: PairingMethod) -> (Self, String) {
        let code = generate_pairing_code();
        let session = PairingSession { state: PairingState::WaitingForPeer, method, verification_code: code.clone() };
        (session, code)
    }

    /// Start as the device that will enter a code or scan a QR (spec.md
    /// §4.8 "responder").
    pub fn start_as_responder() -> Self {
        PairingSession { state: PairingState::WaitingForPeer, method: PairingMethod::NumericCode, verification_code: String::new() }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Submit a user-entered numeric code or passphrase, deriving the
    /// shared workspace id the same way the initiator did.
    pub fn submit_code(&mut self, method: PairingMethod, code: &str) -> Result<PairedWorkspace> {
        if self.state != PairingState::WaitingForPeer {
            self.state = PairingState::Failed;
            return Err(Error::protocol_error("submit_code called outside WaitingForPeer"));
        }
        self.method = method;
        self.verification_code = code.to_string();
        let workspace_id = match method {
            PairingMethod::NumericCode => derive_workspace_id(&format!("code:{code}")),
            PairingMethod::Passphrase => derive_workspace_id(&format!("pass:{code}")),
            PairingMethod::QrCode => {
                self.state = PairingState::Failed;
                return Err(Error::bad_input("submit_code does not accept QrCode; use submit_qr_payload"));
            }
        };
        self.state = PairingState::Complete;
        Ok(PairedWorkspace { workspace_id, peer: None })
    }

    /// Parse and accept a scanned QR payload (spec.md §4.8 "QR Code
    /// payload").
    pub fn submit_qr_payload(&mut self, raw: &str) -> Result<PairedWorkspace> {
        if self.state != PairingState::WaitingForPeer {
            self.state = PairingState::Failed;
            return Err(Error::protocol_error("submit_qr_payload called outside WaitingForPeer"));
        }
        self.state = PairingState::Verifying;
        match decode_qr_payload(raw) {
            Ok(payload) => {
                self.method = PairingMethod::QrCode;
                self.verification_code = payload.code.clone();
                self.state = PairingState::Complete;
                Ok(PairedWorkspace {
                    workspace_id: payload.ws,
                    peer: Some(QrPeerInfo {
                        device_id: payload.id,
                        device_name: payload.name,
                        public_key: payload.pk,
                        address: payload.addr,
                        port: payload.port,
                    }),
                })
            }
            Err(e) => {
                self.state = PairingState::Failed;
                Err(e)
            }
        }
    }

    pub fn cancel(&mut self) {
        if self.state != PairingState::Idle && self.state != PairingState::Complete {
            self.state = PairingState::Idle;
        }
    }
}

/// `v5`-shaped UUID derived from a shared secret, so two devices that only
/// share a code converge on the same workspace id without a transport
/// round trip. Mirrors `deriveWorkspaceIdFromSecret` in the original, not a
/// real RFC 4122 v5 (no real namespace UUID is involved, only the
/// version/variant bit pattern).
fn derive_workspace_id(secret: &str) -> Id {
    let hash = blake3::hash(secret.as_bytes());
    let mut bytes = *hash.as_bytes();
    bytes[6] = (bytes[6] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    let mut uuid_bytes = [0u8; 16];
    uuid_bytes.copy_from_slice(&bytes[..16]);
    uuid::Uuid::from_bytes(uuid_bytes).into()
}

/// The exact wire shape of a pairing QR code (spec.md §4.8): `v,id,ws,name,
/// pk,addr,port,code`, nothing else — `deny_unknown_fields` rejects a QR
/// payload carrying extra keys a malicious generator might use to smuggle
/// data past a naive parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireQrPayload {
    v: u32,
    id: String,
    ws: String,
    name: String,
    pk: String,
    addr: String,
    port: u16,
    code: String,
}

struct DecodedQr {
    id: Id,
    ws: Id,
    name: String,
    pk: [u8; 32],
    addr: String,
    port: u16,
    code: String,
}

fn decode_qr_payload(raw: &str) -> Result<DecodedQr> {
    let wire: WireQrPayload = serde_json::from_str(raw).map_err(|e| Error::bad_input(format!("malformed QR payload: {e}")))?;
    if wire.v != 1 {
        return Err(Error::bad_input(format!("unsupported QR payload version {}", wire.v)));
    }
    if wire.addr.contains("://") {
        return Err(Error::bad_input("QR address must be a bare host, not a URI"));
    }
    let pk_bytes = BASE64
        .decode(&wire.pk)
        .map_err(|e| Error::bad_input(format!("invalid QR public key encoding: {e}")))?;
    let pk: [u8; 32] = pk_bytes
        .try_into()
        .map_err(|_| Error::bad_input("QR public key must be 32 bytes"))?;
    Ok(DecodedQr {
        id: wire.id.parse()?,
        ws: wire.ws.parse()?,
        name: wire.name,
        pk,
        addr: wire.addr,
        port: wire.port,
        code: wire.code,
    })
}

/// Build the QR payload a pairing initiator displays, the mirror image of
/// [`decode_qr_payload`].
pub fn encode_qr_payload(
    device_id: Id,
    workspace_id: Id,
    device_name: &str,
    public_key: &[u8; 32],
    address: &str,
    port: u16,
    code: &str,
) -> String {
    let wire = WireQrPayload {
        v: 1,
        id: device_id.to_string(),
        ws: workspace_id.to_string(),
        name: device_name.to_string(),
        pk: BASE64.encode(public_key),
        addr: address.to_string(),
        port,
        code: code.to_string(),
    };
    serde_json::to_string(&wire).expect("WireQrPayload always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_code_and_passphrase_derive_distinct_workspace_ids() {
        let mut a = PairingSession::start_as_responder();
        let via_code = a.submit_code(PairingMethod::NumericCode, "123456").unwrap();

        let mut b = PairingSession::start_as_responder();
        let via_pass = b.submit_code(PairingMethod::Passphrase, "123456").unwrap();

        assert_ne!(via_code.workspace_id, via_pass.workspace_id);
    }

    #[test]
    fn same_code_same_method_converges_on_same_workspace() {
        let mut a = PairingSession::start_as_responder();
        let mut b = PairingSession::start_as_responder();
        let wa = a.submit_code(PairingMethod::NumericCode, "654321").unwrap();
        let wb = b.submit_code(PairingMethod::NumericCode, "654321").unwrap();
        assert_eq!(wa.workspace_id, wb.workspace_id);
    }

    #[test]
    fn initiator_generated_code_round_trips_through_responder() {
        let (initiator, code) = PairingSession::start_as_initiator(PairingMethod::NumericCode);
        assert_eq!(initiator.state(), PairingState::WaitingForPeer);
        assert_eq!(code.len(), 6);

        let mut responder = PairingSession::start_as_responder();
        let joined = responder.submit_code(PairingMethod::NumericCode, &code).unwrap();
        assert!(!joined.workspace_id.is_nil());
    }

    #[test]
    fn qr_payload_round_trips() {
        let device_id = Id::new();
        let workspace_id = Id::new();
        let pk = [7u8; 32];
        let raw = encode_qr_payload(device_id, workspace_id, "kitchen tablet", &pk, "192.168.1.50", 47001, "998877");

        let mut session = PairingSession::start_as_responder();
        let joined = session.submit_qr_payload(&raw).unwrap();
        assert_eq!(session.state(), PairingState::Complete);
        assert_eq!(joined.workspace_id, workspace_id);
        let peer = joined.peer.unwrap();
        assert_eq!(peer.device_id, device_id);
        assert_eq!(peer.public_key, pk);
        assert_eq!(peer.port, 47001);
    }

    #[test]
    fn qr_payload_rejects_extra_fields() {
        let mut session = PairingSession::start_as_responder();
        let raw = serde_json::json!({
            "v": 1, "id": Id::new().to_string(), "ws": Id::new().to_string(),
            "name": "x", "pk": BASE64.encode([0u8; 32]), "addr": "10.0.0.1", "port": 1,
            "code": "000000", "extra": "smuggled"
        });
        assert!(session.submit_qr_payload(&raw.to_string()).is_err());
        assert_eq!(session.state(), PairingState::Failed);
    }

    #[test]
    fn qr_payload_rejects_unsafe_address_scheme() {
        let mut session = PairingSession::start_as_responder();
        let raw = serde_json::json!({
            "v": 1, "id": Id::new().to_string(), "ws": Id::new().to_string(),
            "name": "x", "pk": BASE64.encode([0u8; 32]), "addr": "file:///etc/passwd", "port": 1,
            "code": "000000"
        });
        assert!(session.submit_qr_payload(&raw.to_string()).is_err());
    }

    #[test]
    fn qr_payload_rejects_wrong_version() {
        let mut session = PairingSession::start_as_responder();
        let raw = serde_json::json!({
            "v": 2, "id": Id::new().to_string(), "ws": Id::new().to_string(),
            "name": "x", "pk": BASE64.encode([0u8; 32]), "addr": "10.0.0.1", "port": 1,
            "code": "000000"
        });
        assert!(session.submit_qr_payload(&raw.to_string()).is_err());
    }
}
