//! Shared error type used across the zinc sync workspace.
//!
//! Every fallible operation in the workspace returns `Result<T, Error>`
//! where `Error` carries a human-readable `message` and a classification
//! `code` drawn from [`ErrorKind`]. See spec.md §7 for the authoritative
//! list of kinds and their local recovery behavior.

use std::fmt;

/// Classification of an [`Error`], mirroring spec.md §7's error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid UUID, oversized frame, malformed JSON. Reject; report to caller.
    BadInput,
    /// Missing row / doc / peer. Report; caller decides.
    NotFound,
    /// Unique-constraint clash (duplicate change). Treat as success (idempotent).
    Conflict,
    /// Disk or socket failure. Transaction rolls back; connection fails.
    IoError,
    /// Handshake failure, MAC mismatch, bad key. Disconnect peer; do not retry.
    CryptoError,
    /// Wrong magic, wrong version, unknown type, out-of-order handshake.
    ProtocolError,
    /// Hello policy returned a Disconnect* variant. Disconnect; no retry until new presence.
    PolicyReject,
    /// Handshake/sync/idle thresholds exceeded. Disconnect; peer eligible for re-dial.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::BadInput => "bad_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::IoError => "io_error",
            ErrorKind::CryptoError => "crypto_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::PolicyReject => "policy_reject",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// A tagged error: a human-readable message plus an [`ErrorKind`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub message: String,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IoError, message)
    }

    pub fn crypto_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CryptoError, message)
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, message)
    }

    pub fn policy_reject(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyReject, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io_error(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::bad_input(err.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
