//! Deterministic, CRDT-agnostic text merging.
//!
//! The sync engine treats CRDT convergence as the document library's
//! problem; this crate only supplies the bounded-memory fallback used
//! when two replicas must reconcile plain text without a shared history.

pub mod three_way;

pub use three_way::{three_way_merge_text, MergeKind, ThreeWayMergeResult};
