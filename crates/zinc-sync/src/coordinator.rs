//! The sync coordinator (spec.md §4.7): ties discovery, transport, and
//! persistence together behind a single run loop task that owns every
//! `PeerConnection`, so no two tasks ever touch the same connection at
//! once. Callers interact with it through [`Coordinator`], a cheap handle
//! that sends [`Command`]s in and drains [`SyncEvent`]s out.
//!
//! Grounded in `examples/original_source/src/network/sync_manager.hpp`'s
//! `SyncManager`, translated from a Qt `QObject` with signal/slot fan-out
//! to one `tokio::spawn`ed loop plus mpsc channels.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use zinc_core::error::Result;
use zinc_core::ids::{Id, Timestamp};
use zinc_crypto::keys::KeyPair;
use zinc_discovery::{Discovery, PeerEvent, ServiceInfo};
use zinc_storage::block::BlockRepository;
use zinc_storage::crdt::CrdtRepository;
use zinc_storage::models::{Device, Workspace};
use zinc_storage::page::PageRepository;
use zinc_storage::store::Store;
use zinc_storage::workspace::WorkspaceRepository;
use zinc_transport::{Connection, MessageType, Server};

use crate::change_batch::{decode_change_batch, encode_change_batch, encode_row_ids, ChangeEnvelope};
use crate::config::discovery_disabled;
use crate::connection_task::{self, ConnTaskEvent, Outbound};
use crate::events::SyncEvent;
use crate::hello::{decide_hello, HelloDecisionKind};
use crate::peer::{candidate_wins, PeerConnection, PeerState};
use crate::snapshot::{apply_pages_snapshot, encode_pages_snapshot};
use crate::wire_hello::{decode_hello, encode_hello, HelloPayload};

/// No traffic for this long on an otherwise-idle connection triggers a
/// `Ping` (spec.md §5 "Timeouts").
const PING_IDLE: Duration = Duration::from_secs(30);
/// Missed pongs before a connection is disconnected.
const MAX_MISSED_PONGS: u32 = 3;
const PING_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// `SyncRequest` without a `SyncResponse` within this long is retried once,
/// then given up on (spec.md §5 "Timeouts").
const SYNC_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Tracks one in-flight `SyncRequest` awaiting a `SyncResponse`.
struct PendingSync {
    sent_at: Timestamp,
    retried: bool,
}

pub struct CoordinatorConfig {
    pub local_device_id: Id,
    pub local_device_name: String,
    pub workspace_id: Id,
    pub local_static: KeyPair,
    pub store: Store,
    pub listen_port: u16,
}

enum Command {
    ConnectToEndpoint { device_id: Id, host: String, port: u16, allow_rekey_on_hello: bool, reply: oneshot::Sender<Result<()>> },
    BroadcastChange { doc_id: Id, changes: Vec<ChangeEnvelope>, reply: oneshot::Sender<Result<()>> },
    RequestSync { device_id: Id, doc_id: Id, reply: oneshot::Sender<Result<()>> },
    ConnectedPeerCount { reply: oneshot::Sender<usize> },
    Stop,
}

/// A cheap, cloneable handle to a running coordinator. Dropping every
/// handle does not stop the run loop; call [`Coordinator::stop`]
/// explicitly (spec.md §4.7 "`stop()` is idempotent").
#[derive(Clone)]
pub struct Coordinator {
    cmd_tx: mpsc::Sender<Command>,
    local_addr: SocketAddr,
}

impl Coordinator {
    /// Bind the transport server and start the run loop, returning the
    /// handle plus the event stream callers drain for UI updates.
    pub async fn start(config: CoordinatorConfig) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        let server = Server::bind(config.listen_port).await?;
        let local_addr = server.local_addr();

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (conn_event_tx, conn_event_rx) = mpsc::channel(256);
        let (accepted_tx, accepted_rx) = mpsc::channel(64);

        let local_static = config.local_static.clone();
        let hello_for_accept = HelloPayload {
            device_id: config.local_device_id,
            workspace_id: config.workspace_id,
            device_name: config.local_device_name.clone(),
            port: local_addr.port(),
        };
        tokio::spawn(server.run(local_static, move || encode_hello(&hello_for_accept), accepted_tx));

        // Discovery (spec.md §4.7 "start(port) to listen and (unless
        // discovery is disabled) advertise and browse"); skipped entirely
        // under `ZINC_SYNC_DISABLE_DISCOVERY`, used for direct-endpoint
        // testing (spec.md §6).
        let (discovery_tx, discovery_rx) = mpsc::channel(256);
        let discovery = if discovery_disabled() {
            None
        } else {
            match Discovery::bind().await {
                Ok(discovery) => {
                    let service_info = ServiceInfo {
                        device_id: config.local_device_id,
                        workspace_id: config.workspace_id,
                        device_name: config.local_device_name.clone(),
                        port: local_addr.port(),
                        fingerprint: zinc_crypto::fingerprint(&config.local_static.public_bytes()),
                    };
                    let mut peer_events = discovery.start(config.local_device_id, service_info);
                    tokio::spawn(async move {
                        while let Some(event) = peer_events.recv().await {
                            if discovery_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    });
                    Some(discovery)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discovery unavailable, continuing without LAN presence");
                    None
                }
            }
        };

        let state = RunState {
            local_device_id: config.local_device_id,
            local_device_name: config.local_device_name,
            workspace_id: config.workspace_id,
            local_static: config.local_static,
            local_port: local_addr.port(),
            crdt: CrdtRepository::new(config.store.clone()),
            blocks: BlockRepository::new(config.store.clone()),
            pages: PageRepository::new(config.store.clone()),
            workspace_repo: WorkspaceRepository::new(config.store),
            peers: HashMap::new(),
            conn_event_tx,
            events: event_tx,
            next_generation: 0,
            discovery,
            autoconnect_attempted: HashSet::new(),
            pending_sync: HashMap::new(),
        };

        tokio::spawn(run_loop(state, cmd_rx, conn_event_rx, accepted_rx, discovery_rx));

        Ok((Coordinator { cmd_tx, local_addr }, event_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dial `host:port`, expecting to reach `device_id` (spec.md §8
    /// scenario 1). `allow_rekey_on_hello` should be `true` only during
    /// pairing, when the remote's workspace id may still be nil or differ
    /// from ours.
    pub async fn connect_to_endpoint(&self, device_id: Id, host: String, port: u16, allow_rekey_on_hello: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(Command::ConnectToEndpoint { device_id, host, port, allow_rekey_on_hello, reply })
            .await;
        rx.await.unwrap_or_else(|_| Err(zinc_core::error::Error::io_error("coordinator stopped")))
    }

    /// Send every change in `changes` (already grouped by document, per
    /// [`crate::change_batch`]) to every Connected peer.
    pub async fn broadcast_change(&self, doc_id: Id, changes: Vec<ChangeEnvelope>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::BroadcastChange { doc_id, changes, reply }).await;
        rx.await.unwrap_or_else(|_| Err(zinc_core::error::Error::io_error("coordinator stopped")))
    }

    pub async fn request_sync(&self, device_id: Id, doc_id: Id) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::RequestSync { device_id, doc_id, reply }).await;
        rx.await.unwrap_or_else(|_| Err(zinc_core::error::Error::io_error("coordinator stopped")))
    }

    pub async fn connected_peer_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::ConnectedPeerCount { reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
    }
}

/// Everything the run loop owns exclusively. Never shared across tasks.
struct RunState {
    local_device_id: Id,
    local_device_name: String,
    workspace_id: Id,
    local_static: KeyPair,
    local_port: u16,
    crdt: CrdtRepository,
    blocks: BlockRepository,
    pages: PageRepository,
    workspace_repo: WorkspaceRepository,
    peers: HashMap<Id, PeerConnection>,
    conn_event_tx: mpsc::Sender<ConnTaskEvent>,
    events: mpsc::Sender<SyncEvent>,
    next_generation: u64,
    /// `None` when discovery is disabled or unavailable. Kept alive so its
    /// advertise/browse/prune tasks keep running and so `stop()` can flip
    /// its stop flag.
    discovery: Option<Discovery>,
    /// Devices we've already dialed once off a `PeerDiscovered` (spec.md
    /// §4.7 "Auto-connect": "the attempt is recorded ... On connection
    /// failure, removal from the set allows future presence updates to
    /// retry").
    autoconnect_attempted: HashSet<Id>,
    /// In-flight `SyncRequest`s awaiting a `SyncResponse`, keyed by
    /// `(device_id, doc_id)` (spec.md §5 "Timeouts").
    pending_sync: HashMap<(Id, Id), PendingSync>,
}

async fn run_loop(
    mut state: RunState,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut conn_event_rx: mpsc::Receiver<ConnTaskEvent>,
    mut accepted_rx: mpsc::Receiver<Result<zinc_transport::AcceptedConnection>>,
    mut discovery_rx: mpsc::Receiver<PeerEvent>,
) {
    let mut ping_ticker = tokio::time::interval(PING_CHECK_INTERVAL);
    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                if handle_command(&mut state, cmd).await {
                    return;
                }
            }
            Some(event) = conn_event_rx.recv() => {
                handle_conn_event(&mut state, event).await;
            }
            Some(accepted) = accepted_rx.recv() => {
                handle_accepted(&mut state, accepted).await;
            }
            Some(peer_event) = discovery_rx.recv() => {
                handle_peer_event(&mut state, peer_event).await;
            }
            _ = ping_ticker.tick() => {
                check_idle_peers(&mut state).await;
                check_sync_timeouts(&mut state).await;
            }
            else => return,
        }
    }
}

/// React to a LAN presence event (spec.md §4.7 "Auto-connect"): surface it
/// to the host application and, for a first sighting in our own workspace,
/// dial the peer exactly once.
async fn handle_peer_event(state: &mut RunState, event: PeerEvent) {
    match event {
        PeerEvent::Discovered(peer) => {
            let _ = state
                .events
                .send(SyncEvent::PeerDiscovered { device_id: peer.device_id, device_name: peer.device_name.clone() })
                .await;
            if peer.workspace_id != state.workspace_id || peer.device_id == state.local_device_id {
                return;
            }
            if state.peers.contains_key(&peer.device_id) || !state.autoconnect_attempted.insert(peer.device_id) {
                return;
            }
            let host = peer.host.to_string();
            if let Err(e) = connect_and_register(state, peer.device_id, &host, peer.port, false).await {
                tracing::debug!(device_id = %peer.device_id, error = %e, "auto-connect failed");
                state.autoconnect_attempted.remove(&peer.device_id);
            }
        }
        PeerEvent::Updated(peer) => {
            let _ = state
                .events
                .send(SyncEvent::PeerDiscovered { device_id: peer.device_id, device_name: peer.device_name })
                .await;
        }
        PeerEvent::Lost(device_id) => {
            let _ = state.events.send(SyncEvent::PeerLost { device_id }).await;
        }
    }
}

async fn handle_command(state: &mut RunState, cmd: Command) -> bool {
    match cmd {
        Command::ConnectToEndpoint { device_id, host, port, allow_rekey_on_hello, reply } => {
            let result = connect_and_register(state, device_id, &host, port, allow_rekey_on_hello).await;
            let _ = reply.send(result);
        }
        Command::BroadcastChange { doc_id, changes, reply } => {
            let payload = zinc_transport::encode_doc_payload(&doc_id, &encode_change_batch(&changes));
            for peer in state.peers.values() {
                if peer.state != PeerState::Error {
                    let _ = peer.outbound.send(Outbound::Send(MessageType::ChangeNotify, payload.clone())).await;
                }
            }
            let _ = reply.send(Ok(()));
        }
        Command::RequestSync { device_id, doc_id, reply } => {
            let result = if let Some(peer) = state.peers.get_mut(&device_id) {
                peer.state = PeerState::Syncing;
                let payload = zinc_transport::encode_doc_payload(&doc_id, &[]);
                peer.outbound.send(Outbound::Send(MessageType::SyncRequest, payload)).await.ok();
                state.pending_sync.insert((device_id, doc_id), PendingSync { sent_at: zinc_core::now_ms(), retried: false });
                Ok(())
            } else {
                Err(zinc_core::error::Error::not_found(format!("no connection to {device_id}")))
            };
            let _ = reply.send(result);
        }
        Command::ConnectedPeerCount { reply } => {
            let count = state.peers.values().filter(|p| p.transport_state == zinc_transport::ConnectionState::Connected).count();
            let _ = reply.send(count);
        }
        Command::Stop => {
            if let Some(discovery) = &state.discovery {
                discovery.stop();
            }
            for peer in state.peers.values() {
                let _ = peer.outbound.send(Outbound::Close).await;
            }
            return true;
        }
    }
    false
}

async fn connect_and_register(state: &mut RunState, device_id: Id, host: &str, port: u16, allow_rekey_on_hello: bool) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| zinc_core::error::Error::bad_input(format!("invalid endpoint {host}:{port}: {e}")))?;
    let local_hello = HelloPayload {
        device_id: state.local_device_id,
        workspace_id: state.workspace_id,
        device_name: state.local_device_name.clone(),
        port: state.local_port,
    };
    let (connection, remote_payload) = Connection::connect(addr, state.local_static.clone(), &encode_hello(&local_hello)).await?;
    accept_new_connection(state, connection, remote_payload, true, device_id, allow_rekey_on_hello, host, port).await
}

async fn handle_accepted(state: &mut RunState, accepted: Result<zinc_transport::AcceptedConnection>) {
    let accepted = match accepted {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "inbound handshake failed");
            return;
        }
    };
    let host = accepted.connection.peer_addr().ip().to_string();
    let port = accepted.connection.peer_addr().port();
    // Expected id is irrelevant: allow_rekey_on_hello=true bypasses the check.
    let _ = accept_new_connection(state, accepted.connection, accepted.initiator_payload, false, Id::nil(), true, &host, port).await;
}

#[allow(clippy::too_many_arguments)]
async fn accept_new_connection(
    state: &mut RunState,
    connection: Connection,
    remote_payload: Vec<u8>,
    initiated_by_us: bool,
    expected_device_id: Id,
    allow_rekey_on_hello: bool,
    host: &str,
    port: u16,
) -> Result<()> {
    let remote_hello = decode_hello(&remote_payload)?;
    let decision = decide_hello(
        state.local_device_id,
        state.workspace_id,
        expected_device_id,
        allow_rekey_on_hello,
        remote_hello.device_id,
        remote_hello.workspace_id,
    );

    let _ = state.events.send(SyncEvent::HelloExchanged { device_id: remote_hello.device_id, decision: decision.clone() }).await;

    if !decision.is_accepted() {
        let mut connection = connection;
        let _ = connection.send(MessageType::Disconnect, decision.reason.as_bytes()).await;
        let _ = connection.close().await;
        return Err(zinc_core::error::Error::policy_reject(decision.reason));
    }

    if decision.kind == HelloDecisionKind::AcceptPairingBootstrap && state.workspace_id.is_nil() {
        state.workspace_id = remote_hello.workspace_id;
    }

    let remote_id = remote_hello.device_id;
    let initiator_id = if initiated_by_us { state.local_device_id } else { remote_id };

    if let Some(existing) = state.peers.get(&remote_id) {
        let existing_initiator = if existing.initiated_by_us { state.local_device_id } else { remote_id };
        if !candidate_wins(existing.transport_state, existing_initiator, zinc_transport::ConnectionState::Connected, initiator_id) {
            // The incumbent wins; close the new, redundant connection.
            let mut connection = connection;
            let _ = connection.close().await;
            return Ok(());
        }
        let _ = existing.outbound.send(Outbound::Close).await;
    }

    if let Some(public_key) = connection.remote_static_key() {
        let device = Device {
            id: remote_id,
            workspace_id: state.workspace_id,
            name: remote_hello.device_name.clone(),
            public_key: public_key.to_vec(),
            paired_at: zinc_core::now_ms(),
            last_seen: zinc_core::now_ms(),
            revoked: false,
        };
        if state.workspace_repo.get_workspace(&state.workspace_id).await.is_err() {
            let _ = state
                .workspace_repo
                .save_workspace(&Workspace {
                    id: state.workspace_id,
                    name: "paired workspace".into(),
                    key_salt: None,
                    created_at: zinc_core::now_ms(),
                    updated_at: zinc_core::now_ms(),
                })
                .await;
        }
        let _ = state.workspace_repo.save_device(&device).await;
    }

    let generation = state.next_generation;
    state.next_generation += 1;

    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let conn_event_tx = state.conn_event_tx.clone();
    tokio::spawn(connection_task::run(remote_id, generation, connection, outbound_rx, conn_event_tx));

    state.peers.insert(
        remote_id,
        PeerConnection {
            device_id: remote_id,
            generation,
            device_name: remote_hello.device_name,
            host: host.to_string(),
            port,
            state: PeerState::Idle,
            transport_state: zinc_transport::ConnectionState::Connected,
            last_sync: None,
            retries: 0,
            initiated_by_us,
            hello_received: true,
            last_rx: zinc_core::now_ms(),
            last_ping_sent: None,
            outbound: outbound_tx,
        },
    );

    let _ = state.events.send(SyncEvent::PeerConnected(remote_id)).await;
    push_pages_snapshots(state, remote_id).await;
    Ok(())
}

/// Data flow (spec.md §2): "on accept, coordinator pushes PagesSnapshot and
/// subscribes to ChangeNotify". Sent once per page in the workspace, right
/// after the peer is registered; failures are logged and skipped rather
/// than tearing down the connection, since a stale/incomplete bulk init is
/// recoverable from a later `SyncRequest`.
async fn push_pages_snapshots(state: &RunState, device_id: Id) {
    let Some(peer) = state.peers.get(&device_id) else { return };
    let pages = match state.pages.by_workspace(&state.workspace_id).await {
        Ok(pages) => pages,
        Err(e) => {
            tracing::warn!(%device_id, error = %e, "failed to list pages for PagesSnapshot push");
            return;
        }
    };
    for page in pages {
        let blocks = match state.blocks.by_page(&page.id).await {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(%device_id, page_id = %page.id, error = %e, "failed to load blocks for PagesSnapshot push");
                continue;
            }
        };
        match encode_pages_snapshot(page.id, &blocks) {
            Ok(payload) => {
                let _ = peer.outbound.send(Outbound::Send(MessageType::PagesSnapshot, payload)).await;
            }
            Err(e) => tracing::warn!(%device_id, page_id = %page.id, error = %e, "failed to encode PagesSnapshot"),
        }
    }
}

async fn handle_conn_event(state: &mut RunState, event: ConnTaskEvent) {
    match event {
        ConnTaskEvent::Frame { device_id, generation, message_type, payload } => {
            let Some(peer) = state.peers.get_mut(&device_id) else { return };
            if peer.generation != generation {
                return; // stale frame from a connection dedup already replaced
            }
            peer.last_rx = zinc_core::now_ms();
            handle_frame(state, device_id, message_type, payload).await;
        }
        ConnTaskEvent::Closed { device_id, generation, reason } => {
            let still_current = matches!(state.peers.get(&device_id), Some(peer) if peer.generation == generation);
            if !still_current {
                return; // the loser of a dedup race closing; the winner is unaffected
            }
            state.peers.remove(&device_id);
            // Eligible for re-dial on the next presence update (spec.md §4.7).
            state.autoconnect_attempted.remove(&device_id);
            let _ = state.events.send(SyncEvent::PeerDisconnected { device_id, reason }).await;
        }
    }
}

async fn handle_frame(state: &mut RunState, device_id: Id, message_type: MessageType, payload: Vec<u8>) {
    match message_type {
        MessageType::SyncRequest => {
            if let Ok((doc_id, _)) = zinc_transport::decode_doc_payload(&payload) {
                let changes = state.crdt.unsynced_changes_for(&doc_id, &device_id).await.unwrap_or_default();
                let envelopes: Vec<ChangeEnvelope> = changes.iter().map(|row| ChangeEnvelope::from_row(doc_id, row)).collect();
                let response = zinc_transport::encode_doc_payload(&doc_id, &encode_change_batch(&envelopes));
                if let Some(peer) = state.peers.get(&device_id) {
                    let _ = peer.outbound.send(Outbound::Send(MessageType::SyncResponse, response)).await;
                }
            }
        }
        MessageType::SyncResponse => {
            if let Ok((doc_id, _)) = zinc_transport::decode_doc_payload(&payload) {
                state.pending_sync.remove(&(device_id, doc_id));
            }
            apply_incoming_changes(state, device_id, &payload).await;
        }
        MessageType::ChangeNotify => {
            apply_incoming_changes(state, device_id, &payload).await;
        }
        MessageType::ChangeAck => {
            if let Ok(row_ids) = crate::change_batch::decode_row_ids(&payload) {
                for row_id in row_ids {
                    let _ = state.crdt.mark_change_synced(row_id, &device_id).await;
                }
            }
            if let Some(peer) = state.peers.get_mut(&device_id) {
                peer.state = PeerState::Idle;
                peer.last_sync = Some(zinc_core::now_ms());
            }
            let _ = state.events.send(SyncEvent::SyncCompleted { device_id, changes_sent: 0, changes_received: 0 }).await;
        }
        MessageType::Ping => {
            if let Some(peer) = state.peers.get(&device_id) {
                let _ = peer.outbound.send(Outbound::Send(MessageType::Pong, Vec::new())).await;
            }
        }
        MessageType::Pong => {
            if let Some(peer) = state.peers.get_mut(&device_id) {
                peer.last_ping_sent = None;
            }
        }
        MessageType::Disconnect => {
            if let Some(peer) = state.peers.remove(&device_id) {
                let _ = peer.outbound.send(Outbound::Close).await;
            }
            let reason = String::from_utf8_lossy(&payload).into_owned();
            let _ = state.events.send(SyncEvent::PeerDisconnected { device_id, reason }).await;
        }
        MessageType::PagesSnapshot => {
            match apply_pages_snapshot(&state.blocks, &payload).await {
                Ok(conflicts) => {
                    if conflicts > 0 {
                        tracing::info!(%device_id, conflicts, "bulk snapshot merged with conflicts");
                    }
                }
                Err(e) => tracing::warn!(%device_id, error = %e, "dropping unpersistable PagesSnapshot"),
            }
        }
        MessageType::Presence => {
            // Opaque to the coordinator (spec.md §6): presence is forwarded
            // to the host application rather than interpreted here; only
            // `last_rx` (already advanced above) matters at this layer.
        }
        MessageType::PairingRequest | MessageType::PairingResponse | MessageType::PairingComplete | MessageType::PairingReject => {
            // Pairing's workspace-id agreement already happened in Hello
            // (AcceptPairingBootstrap); these are available for a richer
            // confirmation handshake but are not required for the coordinator
            // to reach a paired, syncing state.
        }
        MessageType::NoiseMessage1 | MessageType::NoiseMessage2 | MessageType::NoiseMessage3 => {
            tracing::warn!(%device_id, "unexpected handshake frame after Transport");
        }
    }
}

async fn apply_incoming_changes(state: &mut RunState, device_id: Id, payload: &[u8]) {
    let Ok((doc_id, batch_bytes)) = zinc_transport::decode_doc_payload(payload) else { return };
    let Ok(changes) = decode_change_batch(doc_id, &batch_bytes) else { return };
    let mut row_ids = Vec::with_capacity(changes.len());
    for change in &changes {
        match state.crdt.save_change(&doc_id, &change.actor_id, change.seq_num, &change.change_bytes, zinc_core::now_ms()).await {
            Ok(outcome) => {
                // A duplicate still gets row_id into the ack below, so the
                // sender stops resending it, but only a fresh insert is
                // worth telling the host application about.
                row_ids.push(outcome.row_id());
                if outcome.is_new() {
                    let row = zinc_storage::crdt::CrdtChangeRow {
                        row_id: outcome.row_id(),
                        doc_id,
                        change_bytes: change.change_bytes.clone(),
                        actor_id: change.actor_id,
                        seq_num: change.seq_num,
                        created_at: zinc_core::now_ms(),
                    };
                    let _ = state.events.send(SyncEvent::ChangeReceived { doc_id, row }).await;
                }
            }
            Err(e) => tracing::warn!(%doc_id, error = %e, "dropping unpersistable change"),
        }
    }
    if !row_ids.is_empty() {
        if let Some(peer) = state.peers.get(&device_id) {
            let ack = encode_row_ids(&row_ids);
            let _ = peer.outbound.send(Outbound::Send(MessageType::ChangeAck, ack)).await;
        }
    }
}

async fn check_idle_peers(state: &mut RunState) {
    let now: Timestamp = zinc_core::now_ms();
    let mut to_disconnect = Vec::new();
    for (device_id, peer) in state.peers.iter_mut() {
        let idle_for = now - peer.last_rx;
        match peer.last_ping_sent {
            None if idle_for >= PING_IDLE.as_millis() as i64 => {
                peer.last_ping_sent = Some(now);
                let _ = peer.outbound.send(Outbound::Send(MessageType::Ping, Vec::new())).await;
            }
            Some(sent_at) if now - sent_at >= (MAX_MISSED_PONGS as i64) * PING_IDLE.as_millis() as i64 => {
                to_disconnect.push(*device_id);
            }
            _ => {}
        }
    }
    for device_id in to_disconnect {
        if let Some(peer) = state.peers.remove(&device_id) {
            let _ = peer.outbound.send(Outbound::Close).await;
        }
        let _ = state.events.send(SyncEvent::PeerDisconnected { device_id, reason: "ping timeout".into() }).await;
    }
}

/// Retry an unanswered `SyncRequest` once, then give up on it (spec.md §5
/// "Timeouts": "`SyncRequest` without `SyncResponse` within 15 s: retry
/// once, then mark the document as needing a later refill").
async fn check_sync_timeouts(state: &mut RunState) {
    let now = zinc_core::now_ms();
    let timed_out: Vec<(Id, Id)> = state
        .pending_sync
        .iter()
        .filter(|(_, pending)| now - pending.sent_at >= SYNC_REQUEST_TIMEOUT.as_millis() as i64)
        .map(|(key, _)| *key)
        .collect();

    for key @ (device_id, doc_id) in timed_out {
        let retried = state.pending_sync.get(&key).map(|p| p.retried).unwrap_or(false);
        let Some(peer) = state.peers.get(&device_id) else {
            state.pending_sync.remove(&key);
            continue;
        };
        if !retried {
            let payload = zinc_transport::encode_doc_payload(&doc_id, &[]);
            let _ = peer.outbound.send(Outbound::Send(MessageType::SyncRequest, payload)).await;
            state.pending_sync.insert(key, PendingSync { sent_at: now, retried: true });
        } else {
            state.pending_sync.remove(&key);
            let _ = state.events.send(SyncEvent::DocumentNeedsRefill { device_id, doc_id }).await;
        }
    }
}
