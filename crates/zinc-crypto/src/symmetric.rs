//! Symmetric AEAD encryption (ChaCha20-Poly1305) used both for at-rest
//! payload wrapping and as the Noise transport cipher.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use zinc_core::error::{Error, Result};

pub const NONCE_SIZE: usize = 12;
pub const MAC_SIZE: usize = 16;

/// Encrypt `plaintext` under `key`. Output is `nonce || ciphertext || tag`,
/// matching the `encrypt_symmetric` layout the rest of the workspace
/// expects (a random nonce prepended rather than tracked out of band).
pub fn encrypt_symmetric(plaintext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| Error::crypto_error("symmetric encryption failed"))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a buffer produced by [`encrypt_symmetric`].
pub fn decrypt_symmetric(ciphertext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + MAC_SIZE {
        return Err(Error::crypto_error("ciphertext too short"));
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let (nonce_bytes, body) = ciphertext.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, body)
        .map_err(|_| Error::crypto_error("decryption failed (invalid key or corrupted data)"))
}

/// Encrypt with an explicit nonce, used by the Noise transport cipher where
/// nonces are derived from a monotonic counter rather than random bytes.
/// Output is `ciphertext || tag` with no nonce prefix.
pub fn encrypt_with_nonce(plaintext: &[u8], key: &[u8; 32], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| Error::crypto_error("symmetric encryption failed"))
}

/// Decrypt a buffer produced by [`encrypt_with_nonce`].
pub fn decrypt_with_nonce(ciphertext: &[u8], key: &[u8; 32], nonce: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::crypto_error("decryption failed (invalid key or corrupted data)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let key = [3u8; 32];
        let ct = encrypt_symmetric(b"sync me", &key).unwrap();
        let pt = decrypt_symmetric(&ct, &key).unwrap();
        assert_eq!(pt, b"sync me");
    }

    #[test]
    fn wrong_key_fails() {
        let ct = encrypt_symmetric(b"secret", &[1u8; 32]).unwrap();
        assert!(decrypt_symmetric(&ct, &[2u8; 32]).is_err());
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        assert!(decrypt_symmetric(&[0u8; 4], &[1u8; 32]).is_err());
    }
}
