//! Small constant-time helpers used when comparing secrets or key material.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Compare two byte strings in constant time. Returns `false` immediately
/// (non-constant-time) only on a length mismatch, which is not secret.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Overwrite a secret buffer with zeros before it's dropped.
pub fn secure_zero(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_buffers_compare_equal() {
        assert!(constant_time_equal(b"same", b"same"));
    }

    #[test]
    fn different_buffers_compare_unequal() {
        assert!(!constant_time_equal(b"same", b"diff"));
        assert!(!constant_time_equal(b"short", b"longer value"));
    }

    #[test]
    fn secure_zero_clears_buffer() {
        let mut buf = [1u8, 2, 3, 4];
        secure_zero(&mut buf);
        assert_eq!(buf, [0u8; 4]);
    }
}
