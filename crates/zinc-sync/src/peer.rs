//! Per-peer sync state (spec.md §4.7: `PeerConnection = {device_id, conn,
//! state, last_sync, retries, initiated_by_us, hello_received, host, port,
//! device_name}`) and the connection-dedup ranking used when both sides of
//! a pair dial each other at once.

use zinc_core::ids::{Id, Timestamp};
use zinc_transport::ConnectionState;

use crate::connection_task::Outbound;

/// Sync-level progress for one peer, orthogonal to the lower-level
/// [`zinc_transport::ConnectionState`] the Noise handshake drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    Connecting,
    Syncing,
    Streaming,
    Error,
}

/// One entry in the coordinator's peer map. The live `Connection` itself
/// lives inside a dedicated task (`connection_task::run`); this struct
/// holds everything the coordinator's event loop needs plus a channel to
/// ask that task to send a frame or close (spec.md §5: "No two tasks
/// access a `PeerConnection` concurrently").
pub struct PeerConnection {
    pub device_id: Id,
    /// Tags the connection task currently backing this entry, so a
    /// superseded connection's eventual `Closed` event can be told apart
    /// from the surviving one's (see `coordinator::handle_conn_event`).
    pub generation: u64,
    pub device_name: String,
    pub host: String,
    pub port: u16,
    pub state: PeerState,
    pub transport_state: ConnectionState,
    pub last_sync: Option<Timestamp>,
    pub retries: u32,
    pub initiated_by_us: bool,
    pub hello_received: bool,
    pub last_rx: Timestamp,
    pub last_ping_sent: Option<Timestamp>,
    pub outbound: tokio::sync::mpsc::Sender<Outbound>,
}

/// Rank a competing connection for the same remote device id: higher
/// `transport_state` wins; ties broken by `initiator_device_id` ascending
/// (spec.md §4.7 "Connection deduplication"). Returns `true` if `candidate`
/// should replace `incumbent`.
pub fn candidate_wins(
    incumbent_state: ConnectionState,
    incumbent_initiator: Id,
    candidate_state: ConnectionState,
    candidate_initiator: Id,
) -> bool {
    let incumbent_rank = state_rank(incumbent_state);
    let candidate_rank = state_rank(candidate_state);
    match candidate_rank.cmp(&incumbent_rank) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate_initiator < incumbent_initiator,
    }
}

fn state_rank(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Connected => 4,
        ConnectionState::Handshaking => 3,
        ConnectionState::Connecting => 2,
        ConnectionState::Failed => 1,
        ConnectionState::Disconnected => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_transport_state_always_wins() {
        let a = Id::new();
        let b = Id::new();
        assert!(candidate_wins(ConnectionState::Connecting, a, ConnectionState::Connected, b));
        assert!(!candidate_wins(ConnectionState::Connected, a, ConnectionState::Connecting, b));
    }

    #[test]
    fn tie_breaks_on_ascending_initiator_id() {
        let low = Id::from_name(&Id::nil(), b"low");
        let high = Id::from_name(&Id::nil(), b"high-er-value-seed");
        let (smaller, larger) = if low < high { (low, high) } else { (high, low) };
        assert!(candidate_wins(ConnectionState::Connected, larger, ConnectionState::Connected, smaller));
        assert!(!candidate_wins(ConnectionState::Connected, smaller, ConnectionState::Connected, larger));
    }
}
