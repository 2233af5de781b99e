//! The sync coordinator: per-peer pairing, Hello exchange, connection
//! dedup, change exchange, and presence (spec.md §4.7–§4.9, §11).

pub mod block_merge;
pub mod change_batch;
pub mod config;
pub mod connection_task;
pub mod coordinator;
pub mod events;
pub mod hello;
pub mod pairing;
pub mod peer;
pub mod presence;
pub mod snapshot;
pub mod wire_hello;

pub use block_merge::{merge_block_edit, BlockMergeOutcome};
pub use change_batch::{decode_change_batch, decode_row_ids, encode_change_batch, encode_row_ids, ChangeEnvelope};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use events::SyncEvent;
pub use hello::{decide_hello, HelloDecision, HelloDecisionKind};
pub use pairing::{PairedWorkspace, PairingMethod, PairingSession, PairingState, QrPeerInfo};
pub use peer::{candidate_wins, PeerConnection, PeerState};
pub use presence::{decode_presence, encode_presence, PresencePayload};
pub use snapshot::{apply_pages_snapshot, encode_pages_snapshot};
pub use wire_hello::{decode_hello, encode_hello, HelloPayload};
