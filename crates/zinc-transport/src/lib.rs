//! Framed binary transport for zinc sync: magic-prefixed length-delimited
//! frames, carrying a Noise_XX handshake and then an encrypted application
//! protocol (spec.md §4.4).

pub mod connection;
pub mod frame;
pub mod server;
pub mod wire;

pub use connection::{Connection, ConnectionState, HANDSHAKE_TIMEOUT};
pub use frame::{Frame, MessageType, HEADER_LEN, MAGIC, MAX_PAYLOAD_LEN, VERSION};
pub use server::{AcceptedConnection, Server};
pub use wire::{decode_doc_payload, encode_doc_payload};
