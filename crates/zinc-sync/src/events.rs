//! The coordinator's outward event stream (spec.md §9 "Observable events"):
//! one `mpsc::Receiver<SyncEvent>` a host application drains to drive UI
//! state, in the documented emission order.

use zinc_core::ids::Id;
use zinc_storage::crdt::CrdtChangeRow;

use crate::hello::HelloDecision;
use crate::pairing::PairingState;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A device was discovered on the LAN (before any connection exists).
    PeerDiscovered { device_id: Id, device_name: String },
    PeerLost { device_id: Id },

    /// The Noise handshake with `device_id` reached Transport and Hello
    /// was exchanged, annotated with the policy's verdict.
    HelloExchanged { device_id: Id, decision: HelloDecision },
    /// Hello was accepted and the peer was added to the live peer map.
    PeerConnected(Id),
    /// A connection was torn down, either by us, the peer, or a failure.
    PeerDisconnected { device_id: Id, reason: String },

    /// Pairing moved to a new state (spec.md §4.8 pairing state machine).
    PairingStateChanged { state: PairingState },

    /// One change was persisted locally as a result of a sync exchange.
    ChangeReceived { doc_id: Id, row: CrdtChangeRow },
    /// A full sync round with `device_id` finished, successfully or not.
    SyncCompleted { device_id: Id, changes_sent: usize, changes_received: usize },
    SyncFailed { device_id: Id, reason: String },
    /// A `SyncRequest` to `device_id` for `doc_id` went unanswered past the
    /// retry (spec.md §5 "Timeouts": "retry once, then mark the document as
    /// needing a later refill").
    DocumentNeedsRefill { device_id: Id, doc_id: Id },
}
