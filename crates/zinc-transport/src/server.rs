//! TCP accept loop (spec.md §4.4 "Server"): listens on a chosen port (0 =
//! ephemeral) and hands each accepted socket to a fresh [`Connection`] in
//! the Responder role.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use zinc_core::error::{Error, Result};
use zinc_crypto::keys::KeyPair;

use crate::connection::Connection;

/// A connection accepted by [`Server`], already through the Noise
/// handshake, plus the payload the initiator sent inside it.
pub struct AcceptedConnection {
    pub connection: Connection,
    pub initiator_payload: Vec<u8>,
}

/// Listens for inbound connections and completes the responder side of the
/// handshake for each, emitting the result on an mpsc channel so the sync
/// coordinator's event loop can pick them up without blocking the accept
/// loop on a slow or hostile peer.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind `port` (0 for an OS-assigned ephemeral port) and report the
    /// actual bound address.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .map_err(|e| Error::bad_input(format!("invalid bind port {port}: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::io_error(format!("binding {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::io_error(format!("reading bound address: {e}")))?;
        Ok(Server { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop forever, handshaking each inbound socket and
    /// sending the result (success or handshake failure) to `tx`. A failed
    /// handshake is logged and dropped; it never stops the loop (spec.md
    /// §7 ProtocolError/CryptoError: "Disconnect; remain listening").
    pub async fn run(
        self,
        local_static: KeyPair,
        hello_payload: impl Fn() -> Vec<u8> + Send + Sync + 'static,
        tx: mpsc::Sender<Result<AcceptedConnection>>,
    ) {
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept() failed");
                    continue;
                }
            };
            let local_static = local_static.clone();
            let payload = hello_payload();
            let tx = tx.clone();
            tokio::spawn(async move {
                tracing::debug!(%peer_addr, "accepted socket, handshaking as responder");
                let result = Connection::accept(stream, peer_addr, local_static, &payload)
                    .await
                    .map(|(connection, initiator_payload)| AcceptedConnection {
                        connection,
                        initiator_payload,
                    });
                if let Err(e) = &result {
                    tracing::warn!(%peer_addr, error = %e, "handshake failed, remaining listening");
                }
                let _ = tx.send(result).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MessageType;

    #[tokio::test]
    async fn ephemeral_port_is_reported_and_accepts_a_client() {
        let server = Server::bind(0).await.unwrap();
        let addr = server.local_addr();
        assert_ne!(addr.port(), 0);

        let (tx, mut rx) = mpsc::channel(4);
        let responder_static = KeyPair::generate();
        tokio::spawn(server.run(responder_static, || b"hello from server".to_vec(), tx));

        let initiator_static = KeyPair::generate();
        let (mut initiator, responder_payload) =
            Connection::connect(addr, initiator_static, b"hello from client").await.unwrap();
        assert_eq!(responder_payload, b"hello from server");

        let accepted = rx.recv().await.unwrap().unwrap();
        assert_eq!(accepted.initiator_payload, b"hello from client");

        let mut responder = accepted.connection;
        initiator.send(MessageType::Ping, b"ping").await.unwrap();
        let (mt, payload) = responder.recv().await.unwrap();
        assert_eq!(mt, MessageType::Ping);
        assert_eq!(payload, b"ping");
    }
}
