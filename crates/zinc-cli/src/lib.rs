//! Library half of the `zinc` CLI binary, split out so integration tests
//! can drive each command against an in-memory store without spawning a
//! process (the pattern `zinc-storage`'s own repository tests use).

pub mod commands;
