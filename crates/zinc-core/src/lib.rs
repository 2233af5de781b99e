//! Shared foundations for the zinc sync workspace: the error type every
//! crate returns, identifier/timestamp types, and fractional-indexing
//! positional keys.

pub mod error;
pub mod fractional_index;
pub mod ids;

pub use error::{Error, ErrorKind, Result};
pub use fractional_index::FractionalIndex;
pub use ids::{now_ms, Id, Timestamp};
