//! Cryptographic primitives for zinc sync: key management, AEAD encryption
//! and the Noise_XX handshake that authenticates paired devices.
//!
//! Everything here is backed by real, audited crates — there is no
//! reduced-security fallback path. A device that cannot link `x25519-dalek`,
//! `ed25519-dalek` or `chacha20poly1305` cannot join a sync session.

pub mod asymmetric;
pub mod kdf;
pub mod keys;
pub mod noise;
pub mod symmetric;
pub mod util;

pub use asymmetric::{decrypt_asymmetric, encrypt_asymmetric};
pub use kdf::derive_key_from_password;
pub use keys::{fingerprint, generate_pairing_code, generate_salt, random_bytes, verify, KeyPair, SigningKeyPair};
pub use noise::{NoiseMessage1, NoiseMessage2, NoiseMessage3, NoiseRole, NoiseSession, NoiseState};
pub use symmetric::{decrypt_symmetric, encrypt_symmetric};
pub use util::{constant_time_equal, secure_zero};
