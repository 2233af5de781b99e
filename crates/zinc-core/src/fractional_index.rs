//! Fractional positional keys for ordering siblings without renumbering.
//!
//! A [`FractionalIndex`] is a string key ordered lexicographically. Given
//! any two existing keys `a < b`, [`FractionalIndex::between`] produces a
//! new key strictly between them, so a block can be moved anywhere in its
//! sibling list by writing a single row.
//!
//! The key alphabet is ordered the same way its byte values sort, so
//! standard `&str`/`String` comparison is the "lexicographic order" spec.md
//! §3 refers to.

use crate::error::{Error, Result};

/// Base62 alphabet in ascending order: digits, then uppercase, then
/// lowercase — which is also their ASCII byte order, so string comparison
/// and "digit value" comparison agree.
const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ALPHA_LEN: u32 = 62;

fn digit_value(c: u8) -> Option<u32> {
    ALPHABET.iter().position(|&a| a == c).map(|p| p as u32)
}

fn digit_char(v: u32) -> u8 {
    ALPHABET[v as usize]
}

/// An ordered string key. Newtype around `String` so callers can't
/// construct an invalid key by hand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FractionalIndex(String);

impl FractionalIndex {
    /// Wrap an existing key, validating its alphabet.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::bad_input("fractional index key must not be empty"));
        }
        for &b in s.as_bytes() {
            if digit_value(b).is_none() {
                return Err(Error::bad_input(format!(
                    "fractional index key {s:?} contains invalid character {:?}",
                    b as char
                )));
            }
        }
        Ok(FractionalIndex(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A reasonable starting key, used when a list has no siblings yet.
    pub fn first() -> Self {
        Self::between(None, None).expect("between(None, None) is always valid")
    }

    /// A key strictly after `a`, with no upper bound.
    pub fn after(a: &FractionalIndex) -> Self {
        Self::between(Some(a), None).expect("between(Some, None) is always valid")
    }

    /// A key strictly between `a` and `b`. Either bound may be omitted to
    /// mean "no lower/upper bound". If both are given, `a` must sort before
    /// `b` under string order.
    pub fn between(a: Option<&FractionalIndex>, b: Option<&FractionalIndex>) -> Result<Self> {
        if let (Some(a), Some(b)) = (a, b) {
            if a.0 >= b.0 {
                return Err(Error::bad_input(format!(
                    "between() requires a < b, got {:?} >= {:?}",
                    a.0, b.0
                )));
            }
        }

        let a_digits: Vec<u32> = a
            .map(|k| k.0.bytes().map(|c| digit_value(c).unwrap()).collect())
            .unwrap_or_default();
        let b_digits: Option<Vec<u32>> =
            b.map(|k| k.0.bytes().map(|c| digit_value(c).unwrap()).collect());

        let mut out = Vec::new();
        let mut i = 0usize;
        // Once a position follows `a` because it's exactly one below `b`'s
        // digit there (the adjacent-keys case, e.g. "a" vs "b"), every
        // subsequent position has already sorted below `b` and the upper
        // bound no longer binds; without this, two adjacent keys make `da`
        // and `db` both settle at 0 forever and the loop never terminates.
        let mut b_bounded = b_digits.is_some();
        loop {
            let da = a_digits.get(i).copied().unwrap_or(0);
            let db = if b_bounded {
                b_digits.as_ref().unwrap().get(i).copied().unwrap_or(0)
            } else {
                ALPHA_LEN
            };
            if da + 1 < db {
                let mid = da + (db - da) / 2;
                out.push(mid);
                break;
            } else {
                out.push(da);
                if b_bounded && da + 1 == db {
                    b_bounded = false;
                }
                i += 1;
            }
        }

        let s: String = out.into_iter().map(|v| digit_char(v) as char).collect();
        Ok(FractionalIndex(s))
    }
}

impl std::fmt::Display for FractionalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<FractionalIndex> for String {
    fn from(k: FractionalIndex) -> Self {
        k.0
    }
}
