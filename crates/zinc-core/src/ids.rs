//! 128-bit identifiers and monotonic millisecond timestamps.
//!
//! All identifiers in the workspace are random 128-bit values rendered
//! lowercase and hyphenated (spec.md §3). [`Id`] wraps a [`uuid::Uuid`] so
//! every crate shares one parsing/serialization path.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A 128-bit random identifier, rendered lowercase-hyphenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Id(Uuid::new_v4())
    }

    /// The nil id, used as a sentinel for "no workspace yet" during pairing
    /// bootstrap (spec.md §4.7 rule 3).
    pub fn nil() -> Self {
        Id(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Deterministic id derived from an arbitrary byte string (used by
    /// pairing to turn a shared secret into a workspace id).
    pub fn from_name(namespace: &Id, name: &[u8]) -> Self {
        Id(Uuid::new_v5(&namespace.0, name))
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Id)
            .map_err(|e| Error::bad_input(format!("invalid id {s:?}: {e}")))
    }
}

impl From<Uuid> for Id {
    fn from(u: Uuid) -> Self {
        Id(u)
    }
}

impl From<Id> for Uuid {
    fn from(id: Id) -> Self {
        id.0
    }
}

/// Milliseconds since the Unix epoch. Monotonic within a process in the
/// sense that repeated calls to [`now_ms`] never go backwards.
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_display_and_parse() {
        let id = Id::new();
        let s = id.to_string();
        assert_eq!(s.parse::<Id>().unwrap(), id);
        assert_eq!(s.to_lowercase(), s);
        assert!(s.contains('-'));
    }

    #[test]
    fn nil_id_is_recognized() {
        assert!(Id::nil().is_nil());
        assert!(!Id::new().is_nil());
    }

    #[test]
    fn from_name_is_deterministic() {
        let ns = Id::new();
        let a = Id::from_name(&ns, b"code:123456");
        let b = Id::from_name(&ns, b"code:123456");
        assert_eq!(a, b);
        let c = Id::from_name(&ns, b"code:654321");
        assert_ne!(a, c);
    }

    #[test]
    fn now_ms_is_nondecreasing() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
