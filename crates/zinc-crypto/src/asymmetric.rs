//! Public-key encryption: X25519 Diffie-Hellman plus the symmetric AEAD
//! cipher, in the spirit of libsodium's `crypto_box`.

use x25519_dalek::{PublicKey, StaticSecret};
use zinc_core::error::Result;

use crate::symmetric::{decrypt_symmetric, encrypt_symmetric};

/// Encrypt `plaintext` for `recipient_public_key` using `sender_secret_key`.
/// Derives a shared key via X25519 then wraps the payload with the same
/// AEAD used everywhere else in the workspace.
pub fn encrypt_asymmetric(
    plaintext: &[u8],
    recipient_public_key: &PublicKey,
    sender_secret_key: &StaticSecret,
) -> Result<Vec<u8>> {
    let shared = sender_secret_key.diffie_hellman(recipient_public_key);
    let key: [u8; 32] = *blake3::hash(shared.as_bytes()).as_bytes();
    encrypt_symmetric(plaintext, &key)
}

/// Decrypt a buffer produced by [`encrypt_asymmetric`].
pub fn decrypt_asymmetric(
    ciphertext: &[u8],
    sender_public_key: &PublicKey,
    recipient_secret_key: &StaticSecret,
) -> Result<Vec<u8>> {
    let shared = recipient_secret_key.diffie_hellman(sender_public_key);
    let key: [u8; 32] = *blake3::hash(shared.as_bytes()).as_bytes();
    decrypt_symmetric(ciphertext, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    #[test]
    fn round_trips_between_two_parties() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let ct = encrypt_asymmetric(b"hello bob", &bob.public, &alice.secret).unwrap();
        let pt = decrypt_asymmetric(&ct, &alice.public, &bob.secret).unwrap();
        assert_eq!(pt, b"hello bob");
    }

    #[test]
    fn wrong_recipient_cannot_decrypt() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mallory = KeyPair::generate();

        let ct = encrypt_asymmetric(b"hello bob", &bob.public, &alice.secret).unwrap();
        assert!(decrypt_asymmetric(&ct, &alice.public, &mallory.secret).is_err());
    }
}
