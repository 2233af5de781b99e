//! The task that exclusively owns one live [`zinc_transport::Connection`]
//! (spec.md §5: "No two tasks access a `PeerConnection` concurrently").
//! The coordinator never touches the socket directly; it sends [`Outbound`]
//! commands in and receives [`ConnTaskEvent`]s out, both over plain mpsc
//! channels, so the only code that calls `Connection::send`/`recv` is the
//! loop below.

use tokio::sync::mpsc;

use zinc_core::ids::Id;
use zinc_transport::{Connection, MessageType};

/// A command sent to one peer's connection task.
pub enum Outbound {
    Send(MessageType, Vec<u8>),
    Close,
}

/// What the connection task reports back to the coordinator's run loop.
/// `generation` is the value the coordinator assigned when spawning this
/// task, letting it tell a stale loser's `Closed` apart from the winner's
/// when a dedup race replaces one peer map entry with another (spec.md §8
/// scenario 2).
pub enum ConnTaskEvent {
    Frame { device_id: Id, generation: u64, message_type: MessageType, payload: Vec<u8> },
    Closed { device_id: Id, generation: u64, reason: String },
}

/// Drive `connection` until it closes or `Outbound::Close` is received,
/// forwarding every application frame to `events` and outbound commands
/// from `outbound` to the socket. Runs until the connection ends either
/// way; the caller is expected to `tokio::spawn` this.
pub async fn run(
    device_id: Id,
    generation: u64,
    mut connection: Connection,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<ConnTaskEvent>,
) {
    loop {
        tokio::select! {
            recv_result = connection.recv() => {
                match recv_result {
                    Ok((message_type, payload)) => {
                        if events.send(ConnTaskEvent::Frame { device_id, generation, message_type, payload }).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = connection.close().await;
                        let _ = events.send(ConnTaskEvent::Closed { device_id, generation, reason: e.message }).await;
                        return;
                    }
                }
            }
            cmd = outbound.recv() => {
                match cmd {
                    Some(Outbound::Send(message_type, payload)) => {
                        if let Err(e) = connection.send(message_type, &payload).await {
                            let _ = connection.close().await;
                            let _ = events.send(ConnTaskEvent::Closed { device_id, generation, reason: e.message }).await;
                            return;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = connection.close().await;
                        let _ = events.send(ConnTaskEvent::Closed { device_id, generation, reason: "closed locally".into() }).await;
                        return;
                    }
                }
            }
        }
    }
}
