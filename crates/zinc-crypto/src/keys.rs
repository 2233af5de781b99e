//! Asymmetric and signing key material.
//!
//! Diffie-Hellman keys use X25519 (`x25519-dalek`); signatures use Ed25519
//! (`ed25519-dalek`). Both are real, audited implementations — spec.md's
//! predecessor shipped an XOR fallback when libsodium was unavailable; this
//! workspace has no such fallback, ever (see DESIGN.md).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

/// An X25519 key pair used for Noise handshakes and asymmetric encryption.
#[derive(Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: StaticSecret,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        KeyPair { public, secret }
    }

    /// Derive a key pair deterministically from a 32-byte seed. Used by
    /// tests and by device provisioning flows that need reproducible keys.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        KeyPair { public, secret }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

/// An Ed25519 key pair used to sign device identity assertions.
pub struct SigningKeyPair {
    pub signing_key: SigningKey,
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        SigningKeyPair {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        SigningKeyPair {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// Verify a detached Ed25519 signature.
pub fn verify(message: &[u8], signature: &Signature, public_key: &VerifyingKey) -> bool {
    public_key.verify(message, signature).is_ok()
}

/// A random 16-byte salt for password-based key derivation.
pub fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// `count` cryptographically random bytes.
pub fn random_bytes(count: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; count];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// An 8-byte BLAKE3 digest of a public key, displayed to users during
/// pairing so they can visually confirm they're talking to the right peer.
pub fn fingerprint(public_key: &[u8]) -> [u8; 8] {
    let full = blake3::hash(public_key);
    let mut out = [0u8; 8];
    out.copy_from_slice(&full.as_bytes()[..8]);
    out
}

/// A 6-digit numeric pairing code for manual peer verification (spec.md
/// §4.7 "numeric code" pairing mode).
pub fn generate_pairing_code() -> String {
    let code = OsRng.next_u32() % 1_000_000;
    format!("{code:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_seed_is_deterministic() {
        let a = KeyPair::from_seed([7u8; 32]);
        let b = KeyPair::from_seed([7u8; 32]);
        assert_eq!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn fingerprint_is_stable_and_distinguishes_keys() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_eq!(fingerprint(&a.public_bytes()), fingerprint(&a.public_bytes()));
        assert_ne!(fingerprint(&a.public_bytes()), fingerprint(&b.public_bytes()));
    }

    #[test]
    fn pairing_code_is_six_digits() {
        let code = generate_pairing_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"hello peer");
        assert!(verify(b"hello peer", &sig, &kp.verifying_key()));
        assert!(!verify(b"tampered", &sig, &kp.verifying_key()));
    }
}
