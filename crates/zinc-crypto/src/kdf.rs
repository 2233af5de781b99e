//! Password-based key derivation for passphrase pairing (spec.md §4.7).

use argon2::{Argon2, Params, Version};
use zinc_core::error::{Error, Result};

/// Derive a 32-byte symmetric key from a password and salt using Argon2id
/// with interactive-class parameters (19 MiB memory, 2 passes, 1 lane) —
/// the same cost class libsodium's `crypto_pwhash` interactive preset uses.
pub fn derive_key_from_password(password: &str, salt: &[u8; 16]) -> Result<[u8; 32]> {
    let params = Params::new(19 * 1024, 2, 1, Some(32))
        .map_err(|e| Error::crypto_error(format!("invalid argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|e| Error::crypto_error(format!("key derivation failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_given_same_salt() {
        let salt = [9u8; 16];
        let a = derive_key_from_password("correct horse battery staple", &salt).unwrap();
        let b = derive_key_from_password("correct horse battery staple", &salt).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let salt = [9u8; 16];
        let a = derive_key_from_password("password one", &salt).unwrap();
        let b = derive_key_from_password("password two", &salt).unwrap();
        assert_ne!(a, b);
    }
}
