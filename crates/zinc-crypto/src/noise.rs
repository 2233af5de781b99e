//! A Noise_XX handshake, giving paired zinc devices mutual authentication
//! and forward secrecy before any sync traffic flows.
//!
//! ```text
//! -> e                     (initiator sends ephemeral)
//! <- e, ee, s, es          (responder sends ephemeral, static, mixed keys)
//! -> s, se                 (initiator sends static, mixes keys)
//! ```
//!
//! After the handshake both sides hold independent send/receive transport
//! keys derived from the same chaining key, so [`NoiseSession::encrypt`] on
//! one side is decryptable only by [`NoiseSession::decrypt`] on the other.

use x25519_dalek::{PublicKey, StaticSecret};

use zinc_core::error::{Error, Result};

use crate::keys::KeyPair;
use crate::symmetric::{decrypt_symmetric, decrypt_with_nonce, encrypt_symmetric, encrypt_with_nonce};

const PROTOCOL_NAME: &[u8] = b"Noise_XX_25519_ChaChaPoly_BLAKE3";

fn hash(data: &[u8], out_len: usize) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher.finalize_xof().fill(&mut out);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseState {
    Initial,
    WaitingForResponse,
    WaitingForFinal,
    Transport,
    Failed,
}

pub struct NoiseMessage1 {
    pub ephemeral: [u8; 32],
}

pub struct NoiseMessage2 {
    pub ephemeral: [u8; 32],
    pub encrypted_static: Vec<u8>,
    pub encrypted_payload: Vec<u8>,
}

pub struct NoiseMessage3 {
    pub encrypted_static: Vec<u8>,
    pub encrypted_payload: Vec<u8>,
}

/// Drives one side of a Noise_XX handshake through to a transport-ready
/// session. Both `Initiator` and `Responder` use the same type; which
/// methods are valid to call depends on `role` and the current `state`.
pub struct NoiseSession {
    role: NoiseRole,
    state: NoiseState,

    local_static: KeyPair,
    remote_static: Option<PublicKey>,
    local_ephemeral: Option<KeyPair>,
    remote_ephemeral: Option<PublicKey>,

    chaining_key: [u8; 32],
    send_key: [u8; 32],
    recv_key: [u8; 32],
    send_nonce: u64,
    recv_nonce: u64,

    hash_state: Vec<u8>,
}

impl NoiseSession {
    pub fn new(role: NoiseRole, local_static: KeyPair) -> Self {
        let hash_state = PROTOCOL_NAME.to_vec();
        let chaining_key: [u8; 32] = hash(&hash_state, 32).try_into().unwrap();

        NoiseSession {
            role,
            state: NoiseState::Initial,
            local_static,
            remote_static: None,
            local_ephemeral: None,
            remote_ephemeral: None,
            chaining_key,
            send_key: [0u8; 32],
            recv_key: [0u8; 32],
            send_nonce: 0,
            recv_nonce: 0,
            hash_state,
        }
    }

    pub fn state(&self) -> NoiseState {
        self.state
    }

    pub fn is_transport_ready(&self) -> bool {
        self.state == NoiseState::Transport
    }

    pub fn remote_static_key(&self) -> Option<&PublicKey> {
        self.remote_static.as_ref()
    }

    fn dh(secret: &StaticSecret, public: &PublicKey) -> [u8; 32] {
        secret.diffie_hellman(public).to_bytes()
    }

    fn mix_key(&mut self, input_key_material: &[u8]) {
        let mut to_hash = Vec::with_capacity(32 + input_key_material.len());
        to_hash.extend_from_slice(&self.chaining_key);
        to_hash.extend_from_slice(input_key_material);
        let h = hash(&to_hash, 64);
        self.chaining_key.copy_from_slice(&h[..32]);
    }

    fn mix_hash(&mut self, data: &[u8]) {
        self.hash_state.extend_from_slice(data);
        self.hash_state = hash(&self.hash_state, 64);
    }

    fn split_keys(&mut self) {
        let temp = hash(&self.chaining_key, 64);
        match self.role {
            NoiseRole::Initiator => {
                self.send_key.copy_from_slice(&temp[..32]);
                self.recv_key.copy_from_slice(&temp[32..]);
            }
            NoiseRole::Responder => {
                self.recv_key.copy_from_slice(&temp[..32]);
                self.send_key.copy_from_slice(&temp[32..]);
            }
        }
        self.state = NoiseState::Transport;
    }

    /// Initiator step 1: `-> e`.
    pub fn create_message1(&mut self) -> Result<NoiseMessage1> {
        if self.role != NoiseRole::Initiator || self.state != NoiseState::Initial {
            self.state = NoiseState::Failed;
            return Err(Error::protocol_error("invalid state for noise message 1"));
        }

        let ephemeral = KeyPair::generate();
        self.mix_hash(&ephemeral.public_bytes());
        let msg = NoiseMessage1 {
            ephemeral: ephemeral.public_bytes(),
        };
        self.local_ephemeral = Some(ephemeral);
        self.state = NoiseState::WaitingForResponse;
        Ok(msg)
    }

    /// Responder step 1: consume `-> e`, produce `<- e, ee, s, es`.
    pub fn process_message1(&mut self, msg: &NoiseMessage1, payload: &[u8]) -> Result<NoiseMessage2> {
        if self.role != NoiseRole::Responder || self.state != NoiseState::Initial {
            self.state = NoiseState::Failed;
            return Err(Error::protocol_error("invalid state for processing noise message 1"));
        }

        let remote_ephemeral = PublicKey::from(msg.ephemeral);
        self.mix_hash(remote_ephemeral.as_bytes());
        self.remote_ephemeral = Some(remote_ephemeral);

        let local_ephemeral = KeyPair::generate();
        self.mix_hash(&local_ephemeral.public_bytes());

        let ee = Self::dh(&local_ephemeral.secret, &remote_ephemeral);
        self.mix_key(&ee);

        let encrypted_static = encrypt_symmetric(&self.local_static.public_bytes(), &self.chaining_key)?;
        self.mix_hash(&encrypted_static);

        let es = Self::dh(&self.local_static.secret, &remote_ephemeral);
        self.mix_key(&es);

        let encrypted_payload = encrypt_symmetric(payload, &self.chaining_key)?;
        self.mix_hash(&encrypted_payload);

        let out = NoiseMessage2 {
            ephemeral: local_ephemeral.public_bytes(),
            encrypted_static,
            encrypted_payload,
        };
        self.local_ephemeral = Some(local_ephemeral);
        self.state = NoiseState::WaitingForFinal;
        Ok(out)
    }

    /// Initiator step 2: consume `<- e, ee, s, es`, produce `-> s, se`.
    /// Returns the responder's handshake payload alongside the outgoing
    /// message so both sides exchange a payload in one round trip.
    pub fn process_message2(&mut self, msg: &NoiseMessage2, payload: &[u8]) -> Result<(NoiseMessage3, Vec<u8>)> {
        if self.role != NoiseRole::Initiator || self.state != NoiseState::WaitingForResponse {
            self.state = NoiseState::Failed;
            return Err(Error::protocol_error("invalid state for processing noise message 2"));
        }
        let local_ephemeral = self
            .local_ephemeral
            .as_ref()
            .ok_or_else(|| Error::protocol_error("missing local ephemeral key"))?;

        let remote_ephemeral = PublicKey::from(msg.ephemeral);
        self.mix_hash(remote_ephemeral.as_bytes());

        let ee = Self::dh(&local_ephemeral.secret, &remote_ephemeral);
        self.mix_key(&ee);

        self.mix_hash(&msg.encrypted_static);
        let remote_static_bytes = decrypt_symmetric(&msg.encrypted_static, &self.chaining_key)?;
        if remote_static_bytes.len() != 32 {
            self.state = NoiseState::Failed;
            return Err(Error::crypto_error("invalid remote static key size"));
        }
        let mut remote_static_raw = [0u8; 32];
        remote_static_raw.copy_from_slice(&remote_static_bytes);
        let remote_static = PublicKey::from(remote_static_raw);

        let es = Self::dh(&local_ephemeral.secret, &remote_static);
        self.mix_key(&es);
        self.mix_hash(&msg.encrypted_payload);
        let remote_payload = decrypt_symmetric(&msg.encrypted_payload, &self.chaining_key)?;

        let encrypted_static = encrypt_symmetric(&self.local_static.public_bytes(), &self.chaining_key)?;
        self.mix_hash(&encrypted_static);

        let se = Self::dh(&self.local_static.secret, &remote_ephemeral);
        self.mix_key(&se);

        let encrypted_payload = encrypt_symmetric(payload, &self.chaining_key)?;
        self.mix_hash(&encrypted_payload);

        self.remote_ephemeral = Some(remote_ephemeral);
        self.remote_static = Some(remote_static);
        self.split_keys();

        Ok((
            NoiseMessage3 {
                encrypted_static,
                encrypted_payload,
            },
            remote_payload,
        ))
    }

    /// Responder step 2: consume `-> s, se`, returns the initiator's
    /// handshake payload. Transport keys are ready after this call.
    pub fn process_message3(&mut self, msg: &NoiseMessage3) -> Result<Vec<u8>> {
        if self.role != NoiseRole::Responder || self.state != NoiseState::WaitingForFinal {
            self.state = NoiseState::Failed;
            return Err(Error::protocol_error("invalid state for processing noise message 3"));
        }
        let local_ephemeral = self
            .local_ephemeral
            .as_ref()
            .ok_or_else(|| Error::protocol_error("missing local ephemeral key"))?;
        let remote_ephemeral = self
            .remote_ephemeral
            .ok_or_else(|| Error::protocol_error("missing remote ephemeral key"))?;

        self.mix_hash(&msg.encrypted_static);
        let remote_static_bytes = decrypt_symmetric(&msg.encrypted_static, &self.chaining_key)?;
        if remote_static_bytes.len() != 32 {
            self.state = NoiseState::Failed;
            return Err(Error::crypto_error("invalid remote static key size"));
        }
        let mut remote_static_raw = [0u8; 32];
        remote_static_raw.copy_from_slice(&remote_static_bytes);
        let remote_static = PublicKey::from(remote_static_raw);

        let se = Self::dh(&local_ephemeral.secret, &remote_static);
        self.mix_key(&se);
        self.mix_hash(&msg.encrypted_payload);

        let payload = decrypt_symmetric(&msg.encrypted_payload, &self.chaining_key)?;

        self.remote_static = Some(remote_static);
        let _ = remote_ephemeral;
        self.split_keys();
        Ok(payload)
    }

    fn nonce_bytes(counter: u64) -> [u8; 12] {
        let mut n = [0u8; 12];
        n[4..].copy_from_slice(&counter.to_le_bytes());
        n
    }

    /// Encrypt a transport message. Only valid once [`Self::is_transport_ready`].
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.state != NoiseState::Transport {
            return Err(Error::protocol_error("noise transport not ready"));
        }
        let nonce = Self::nonce_bytes(self.send_nonce);
        self.send_nonce += 1;
        encrypt_with_nonce(plaintext, &self.send_key, &nonce)
    }

    /// Decrypt a transport message produced by the peer's [`Self::encrypt`].
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if self.state != NoiseState::Transport {
            return Err(Error::protocol_error("noise transport not ready"));
        }
        let nonce = Self::nonce_bytes(self.recv_nonce);
        let pt = decrypt_with_nonce(ciphertext, &self.recv_key, &nonce)?;
        self.recv_nonce += 1;
        Ok(pt)
    }
}

pub fn serialize_message1(msg: &NoiseMessage1) -> Vec<u8> {
    msg.ephemeral.to_vec()
}

pub fn serialize_message2(msg: &NoiseMessage2) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 4 + msg.encrypted_static.len() + msg.encrypted_payload.len());
    out.extend_from_slice(&msg.ephemeral);
    out.extend_from_slice(&(msg.encrypted_static.len() as u32).to_le_bytes());
    out.extend_from_slice(&msg.encrypted_static);
    out.extend_from_slice(&msg.encrypted_payload);
    out
}

pub fn serialize_message3(msg: &NoiseMessage3) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + msg.encrypted_static.len() + msg.encrypted_payload.len());
    out.extend_from_slice(&(msg.encrypted_static.len() as u32).to_le_bytes());
    out.extend_from_slice(&msg.encrypted_static);
    out.extend_from_slice(&msg.encrypted_payload);
    out
}

pub fn deserialize_message1(data: &[u8]) -> Result<NoiseMessage1> {
    if data.len() != 32 {
        return Err(Error::protocol_error("invalid noise message 1 size"));
    }
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(data);
    Ok(NoiseMessage1 { ephemeral })
}

pub fn deserialize_message2(data: &[u8]) -> Result<NoiseMessage2> {
    if data.len() < 32 + 4 {
        return Err(Error::protocol_error("invalid noise message 2 size"));
    }
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(&data[..32]);
    let static_len = u32::from_le_bytes(data[32..36].try_into().unwrap()) as usize;
    let body = &data[36..];
    if body.len() < static_len {
        return Err(Error::protocol_error("invalid noise message 2 static length"));
    }
    let (encrypted_static, rest) = body.split_at(static_len);
    Ok(NoiseMessage2 {
        ephemeral,
        encrypted_static: encrypted_static.to_vec(),
        encrypted_payload: rest.to_vec(),
    })
}

pub fn deserialize_message3(data: &[u8]) -> Result<NoiseMessage3> {
    if data.len() < 4 {
        return Err(Error::protocol_error("invalid noise message 3 size"));
    }
    let static_len = u32::from_le_bytes(data[..4].try_into().unwrap()) as usize;
    let body = &data[4..];
    if body.len() < static_len {
        return Err(Error::protocol_error("invalid noise message 3 static length"));
    }
    let (encrypted_static, rest) = body.split_at(static_len);
    Ok(NoiseMessage3 {
        encrypted_static: encrypted_static.to_vec(),
        encrypted_payload: rest.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_handshake_yields_matching_transport_keys() {
        let initiator_static = KeyPair::generate();
        let responder_static = KeyPair::generate();

        let mut initiator = NoiseSession::new(NoiseRole::Initiator, initiator_static);
        let mut responder = NoiseSession::new(NoiseRole::Responder, responder_static);

        let m1 = initiator.create_message1().unwrap();
        let m2 = responder.process_message1(&m1, b"hello from responder").unwrap();
        let (m3, received_from_responder) = initiator.process_message2(&m2, b"hello from initiator").unwrap();
        let responder_payload = responder.process_message3(&m3).unwrap();

        assert_eq!(received_from_responder, b"hello from responder");
        assert_eq!(responder_payload, b"hello from initiator");
        assert!(initiator.is_transport_ready());
        assert!(responder.is_transport_ready());

        let ct = initiator.encrypt(b"sync frame").unwrap();
        let pt = responder.decrypt(&ct).unwrap();
        assert_eq!(pt, b"sync frame");

        let ct2 = responder.encrypt(b"ack").unwrap();
        let pt2 = initiator.decrypt(&ct2).unwrap();
        assert_eq!(pt2, b"ack");
    }

    #[test]
    fn wire_round_trip_for_all_messages() {
        let initiator_static = KeyPair::generate();
        let responder_static = KeyPair::generate();

        let mut initiator = NoiseSession::new(NoiseRole::Initiator, initiator_static);
        let mut responder = NoiseSession::new(NoiseRole::Responder, responder_static);

        let m1 = initiator.create_message1().unwrap();
        let m1 = deserialize_message1(&serialize_message1(&m1)).unwrap();

        let m2 = responder.process_message1(&m1, &[]).unwrap();
        let m2 = deserialize_message2(&serialize_message2(&m2)).unwrap();

        let (m3, _) = initiator.process_message2(&m2, &[]).unwrap();
        let m3 = deserialize_message3(&serialize_message3(&m3)).unwrap();

        assert!(responder.process_message3(&m3).is_ok());
    }

    #[test]
    fn wrong_role_call_fails_closed() {
        let kp = KeyPair::generate();
        let mut responder = NoiseSession::new(NoiseRole::Responder, kp);
        assert!(responder.create_message1().is_err());
        assert_eq!(responder.state(), NoiseState::Failed);
    }
}
