//! LAN peer discovery for zinc sync: UDP multicast+broadcast presence
//! beacons and a TTL'd peer table (spec.md §4.5).

pub mod datagram;
pub mod discovery;
pub mod peer_table;

pub use datagram::{decode_datagram, encode_datagram, PeerInfo, ServiceInfo};
pub use discovery::{Discovery, DISCOVERY_PORT, MULTICAST_ADDR};
pub use peer_table::{PeerEvent, PeerTable, PEER_TTL_MS};
