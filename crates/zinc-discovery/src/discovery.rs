//! Ties the datagram codec and peer table to real UDP sockets: advertises
//! this device on the LAN and browses for others (spec.md §4.5).
//!
//! Grounded in `examples/original_source/src/network/udp_discovery_backend.cpp`,
//! translated from Qt's `QUdpSocket`/`QTimer` to `tokio::net::UdpSocket`
//! plus `tokio::time::interval`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use zinc_core::error::{Error, Result};
use zinc_core::ids::Id;

use crate::datagram::{decode_datagram, encode_datagram, ServiceInfo, MAX_DATAGRAM_LEN};
use crate::peer_table::{PeerEvent, PeerTable, ADVERTISE_INTERVAL_MS, PRUNE_INTERVAL_MS};

pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 77, 77);
pub const DISCOVERY_PORT: u16 = 47777;

/// A running discovery session: one advertise task, one browse task, one
/// prune task, sharing a [`PeerTable`] and a stop flag.
pub struct Discovery {
    socket: Arc<UdpSocket>,
    peer_table: Arc<Mutex<PeerTable>>,
    stopping: Arc<AtomicBool>,
}

impl Discovery {
    /// Bind the discovery port, join the multicast group, and enable
    /// broadcast (spec.md: "UDP multicast ... plus broadcast fallback").
    pub async fn bind() -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT))
            .await
            .map_err(|e| Error::io_error(format!("binding discovery port {DISCOVERY_PORT}: {e}")))?;
        socket
            .join_multicast_v4(MULTICAST_ADDR, Ipv4Addr::UNSPECIFIED)
            .map_err(|e| Error::io_error(format!("joining multicast group {MULTICAST_ADDR}: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::io_error(format!("enabling broadcast: {e}")))?;

        Ok(Discovery {
            socket: Arc::new(socket),
            peer_table: Arc::new(Mutex::new(PeerTable::new())),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start advertising `service_info` and browsing for peers of
    /// `local_id`. Returns an event stream the coordinator listens on for
    /// `PeerDiscovered`/`PeerUpdated`/`PeerLost`.
    pub fn start(&self, local_id: Id, service_info: ServiceInfo) -> mpsc::Receiver<PeerEvent> {
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(advertise_loop(self.socket.clone(), service_info, self.stopping.clone()));
        tokio::spawn(browse_loop(
            self.socket.clone(),
            local_id,
            self.peer_table.clone(),
            tx.clone(),
            self.stopping.clone(),
        ));
        tokio::spawn(prune_loop(self.peer_table.clone(), tx, self.stopping.clone()));

        rx
    }

    /// Idempotent: sets the stop flag so in-flight loop iterations
    /// short-circuit instead of scheduling another timer tick or send
    /// (spec.md §5 "Cancellation").
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn peer_count(&self) -> usize {
        self.peer_table.lock().len()
    }
}

async fn advertise_loop(socket: Arc<UdpSocket>, service_info: ServiceInfo, stopping: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(ADVERTISE_INTERVAL_MS as u64));
    let broadcast_addr = SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT));
    let multicast_addr = SocketAddr::from((MULTICAST_ADDR, DISCOVERY_PORT));
    loop {
        ticker.tick().await;
        if stopping.load(Ordering::SeqCst) {
            return;
        }
        let datagram = encode_datagram(&service_info, zinc_core::now_ms());
        if let Err(e) = socket.send_to(&datagram, multicast_addr).await {
            tracing::debug!(error = %e, "multicast advertise send failed");
        }
        if let Err(e) = socket.send_to(&datagram, broadcast_addr).await {
            tracing::debug!(error = %e, "broadcast advertise send failed");
        }
    }
}

async fn browse_loop(
    socket: Arc<UdpSocket>,
    local_id: Id,
    peer_table: Arc<Mutex<PeerTable>>,
    events: mpsc::Sender<PeerEvent>,
    stopping: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        if stopping.load(Ordering::SeqCst) {
            return;
        }
        let (len, sender) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!(error = %e, "discovery recv failed");
                continue;
            }
        };
        if stopping.load(Ordering::SeqCst) {
            return;
        }
        let peer = match decode_datagram(&buf[..len], sender.ip()) {
            Ok(peer) => peer,
            Err(e) => {
                tracing::trace!(error = %e, %sender, "dropped invalid discovery datagram");
                continue;
            }
        };
        let event = peer_table.lock().observe(&local_id, peer);
        if let Some(event) = event {
            let _ = events.send(event).await;
        }
    }
}

async fn prune_loop(peer_table: Arc<Mutex<PeerTable>>, events: mpsc::Sender<PeerEvent>, stopping: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(PRUNE_INTERVAL_MS as u64));
    loop {
        ticker.tick().await;
        if stopping.load(Ordering::SeqCst) {
            return;
        }
        let lost = peer_table.lock().prune(zinc_core::now_ms());
        for event in lost {
            let _ = events.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_joins_multicast_group_and_reports_peer_count_zero() {
        // Binding a real multicast socket works in most sandboxes but not
        // all (some CI network namespaces disallow IGMP joins); skip
        // rather than fail spuriously if the bind itself errors.
        let Ok(discovery) = Discovery::bind().await else { return };
        assert_eq!(discovery.peer_count(), 0);
        discovery.stop();
    }
}
