//! The discovery peer table: upsert-on-heartbeat, prune-on-timeout
//! (spec.md §4.5).

use std::collections::HashMap;

use zinc_core::ids::{Id, Timestamp};

use crate::datagram::PeerInfo;

/// TTL after which a peer with no heartbeat is considered lost. Checked by
/// a prune timer that fires every [`PRUNE_INTERVAL_MS`].
pub const PEER_TTL_MS: i64 = 6_000;
pub const PRUNE_INTERVAL_MS: i64 = 1_000;
pub const ADVERTISE_INTERVAL_MS: i64 = 1_500;

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Discovered(PeerInfo),
    Updated(PeerInfo),
    Lost(Id),
}

/// Tracks peers seen on the LAN, keyed by device id. Not itself async —
/// the UDP browse loop feeds it datagrams and timer ticks, and reacts to
/// the events it returns.
#[derive(Default)]
pub struct PeerTable {
    peers: HashMap<Id, PeerInfo>,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable::default()
    }

    /// Upsert a peer learned from a valid datagram whose `id` differs from
    /// `local_id` (the advertiser's own datagrams are ignored per spec.md
    /// §4.5). Returns `Discovered` on first sight or `Updated` when the
    /// heartbeat refreshed an existing entry's endpoint/metadata.
    pub fn observe(&mut self, local_id: &Id, peer: PeerInfo) -> Option<PeerEvent> {
        if &peer.device_id == local_id {
            return None;
        }
        match self.peers.get(&peer.device_id) {
            None => {
                self.peers.insert(peer.device_id, peer.clone());
                Some(PeerEvent::Discovered(peer))
            }
            Some(existing) => {
                let changed = existing.host != peer.host || existing.port != peer.port || existing.device_name != peer.device_name;
                self.peers.insert(peer.device_id, peer.clone());
                if changed {
                    Some(PeerEvent::Updated(peer))
                } else {
                    // Still a heartbeat refresh (last_seen advances), but
                    // nothing externally visible changed; no event needed.
                    None
                }
            }
        }
    }

    /// Remove every peer whose `last_seen` is older than [`PEER_TTL_MS`],
    /// returning a `Lost` event for each. A peer is never reported lost
    /// between two consecutive heartbeats (spec.md §5): pruning only acts
    /// on entries that have actually gone silent for a full TTL window.
    pub fn prune(&mut self, now: Timestamp) -> Vec<PeerEvent> {
        let stale: Vec<Id> = self
            .peers
            .iter()
            .filter(|(_, p)| now - p.last_seen > PEER_TTL_MS)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale.into_iter().map(PeerEvent::Lost).collect()
    }

    pub fn get(&self, id: &Id) -> Option<&PeerInfo> {
        self.peers.get(id)
    }

    pub fn peers_in_workspace(&self, workspace_id: &Id) -> Vec<&PeerInfo> {
        self.peers.values().filter(|p| &p.workspace_id == workspace_id).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(id: Id, ws: Id, port: u16, last_seen: Timestamp) -> PeerInfo {
        PeerInfo {
            device_id: id,
            workspace_id: ws,
            device_name: "device".into(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            fingerprint: [0; 8],
            last_seen,
        }
    }

    #[test]
    fn first_sight_emits_discovered() {
        let mut table = PeerTable::new();
        let local = Id::new();
        let remote = Id::new();
        let ws = Id::new();
        let event = table.observe(&local, peer(remote, ws, 9000, 0));
        assert_eq!(event, Some(PeerEvent::Discovered(peer(remote, ws, 9000, 0))));
    }

    #[test]
    fn self_datagrams_are_ignored() {
        let mut table = PeerTable::new();
        let local = Id::new();
        let ws = Id::new();
        assert_eq!(table.observe(&local, peer(local, ws, 9000, 0)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn endpoint_change_emits_updated_plain_heartbeat_emits_nothing() {
        let mut table = PeerTable::new();
        let local = Id::new();
        let remote = Id::new();
        let ws = Id::new();
        table.observe(&local, peer(remote, ws, 9000, 0));

        // Pure heartbeat refresh: same endpoint, newer timestamp.
        let refreshed = table.observe(&local, peer(remote, ws, 9000, 1_000));
        assert_eq!(refreshed, None);

        // Endpoint changed: port moved.
        let updated = table.observe(&local, peer(remote, ws, 9001, 2_000));
        assert!(matches!(updated, Some(PeerEvent::Updated(_))));
    }

    #[test]
    fn prune_removes_only_stale_peers() {
        let mut table = PeerTable::new();
        let local = Id::new();
        let fresh = Id::new();
        let stale = Id::new();
        let ws = Id::new();
        table.observe(&local, peer(fresh, ws, 9000, 5_000));
        table.observe(&local, peer(stale, ws, 9001, 0));

        let events = table.prune(6_500);
        assert_eq!(events, vec![PeerEvent::Lost(stale)]);
        assert_eq!(table.len(), 1);
        assert!(table.get(&fresh).is_some());
    }
}
