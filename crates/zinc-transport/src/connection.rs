//! A single peer connection: dial-or-accept, drive the Noise_XX handshake,
//! then send/receive encrypted application frames.
//!
//! Grounded in `examples/original_source/src/network/transport.hpp`'s
//! `Connection` class and its `Disconnected -> Connecting -> Handshaking ->
//! Connected -> (Failed | Disconnected)` state machine (spec.md §4.4).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use zinc_core::error::{Error, Result};
use zinc_crypto::keys::KeyPair;
use zinc_crypto::noise::{self, NoiseRole, NoiseSession};

use crate::frame::{Frame, MessageType, HEADER_LEN};

/// Time allowed for a handshake to reach [`ConnectionState::Connected`]
/// (spec.md §5 "Timeouts").
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
    Failed,
}

/// One TCP connection to a peer, in either Noise role. Only `Connected`
/// accepts application-level `send`/`recv` — see spec.md §4.4 "Connection
/// states".
pub struct Connection {
    stream: TcpStream,
    state: ConnectionState,
    noise: NoiseSession,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Dial `addr` and run the Noise_XX handshake as initiator, exchanging
    /// `local_payload` / returning the responder's payload. Fails closed:
    /// any handshake error leaves the connection `Failed` and the socket
    /// is not returned to the caller.
    pub async fn connect(
        addr: SocketAddr,
        local_static: KeyPair,
        local_payload: &[u8],
    ) -> Result<(Self, Vec<u8>)> {
        let stream = tokio::time::timeout(HANDSHAKE_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout(format!("connecting to {addr}")))?
            .map_err(|e| Error::io_error(format!("connecting to {addr}: {e}")))?;

        let mut conn = Connection {
            stream,
            state: ConnectionState::Handshaking,
            noise: NoiseSession::new(NoiseRole::Initiator, local_static),
            peer_addr: addr,
        };

        let result = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.run_initiator_handshake(local_payload)).await;
        match result {
            Ok(Ok(responder_payload)) => {
                conn.state = ConnectionState::Connected;
                Ok((conn, responder_payload))
            }
            Ok(Err(e)) => {
                conn.state = ConnectionState::Failed;
                Err(e)
            }
            Err(_) => {
                conn.state = ConnectionState::Failed;
                Err(Error::timeout(format!("handshake with {addr} did not complete in time")))
            }
        }
    }

    /// Wrap an accepted socket as a responder, awaiting the initiator's
    /// messages and replying with `local_payload`.
    pub async fn accept(
        stream: TcpStream,
        peer_addr: SocketAddr,
        local_static: KeyPair,
        local_payload: &[u8],
    ) -> Result<(Self, Vec<u8>)> {
        let mut conn = Connection {
            stream,
            state: ConnectionState::Handshaking,
            noise: NoiseSession::new(NoiseRole::Responder, local_static),
            peer_addr,
        };

        let result = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.run_responder_handshake(local_payload)).await;
        match result {
            Ok(Ok(initiator_payload)) => {
                conn.state = ConnectionState::Connected;
                Ok((conn, initiator_payload))
            }
            Ok(Err(e)) => {
                conn.state = ConnectionState::Failed;
                Err(e)
            }
            Err(_) => {
                conn.state = ConnectionState::Failed;
                Err(Error::timeout(format!("handshake with {peer_addr} did not complete in time")))
            }
        }
    }

    async fn run_initiator_handshake(&mut self, local_payload: &[u8]) -> Result<Vec<u8>> {
        let m1 = self.noise.create_message1()?;
        self.write_raw_frame(MessageType::NoiseMessage1, &noise::serialize_message1(&m1)).await?;

        let (mt, payload) = self.read_raw_frame().await?;
        if mt != MessageType::NoiseMessage2 {
            return Err(Error::protocol_error(format!("expected NoiseMessage2, got {mt:?}")));
        }
        let m2 = noise::deserialize_message2(&payload)?;
        let (m3, responder_payload) = self.noise.process_message2(&m2, local_payload)?;
        self.write_raw_frame(MessageType::NoiseMessage3, &noise::serialize_message3(&m3)).await?;

        Ok(responder_payload)
    }

    async fn run_responder_handshake(&mut self, local_payload: &[u8]) -> Result<Vec<u8>> {
        let (mt, payload) = self.read_raw_frame().await?;
        if mt != MessageType::NoiseMessage1 {
            return Err(Error::protocol_error(format!("expected NoiseMessage1, got {mt:?}")));
        }
        let m1 = noise::deserialize_message1(&payload)?;
        let m2 = self.noise.process_message1(&m1, local_payload)?;
        self.write_raw_frame(MessageType::NoiseMessage2, &noise::serialize_message2(&m2)).await?;

        let (mt, payload) = self.read_raw_frame().await?;
        if mt != MessageType::NoiseMessage3 {
            return Err(Error::protocol_error(format!("expected NoiseMessage3, got {mt:?}")));
        }
        let m3 = noise::deserialize_message3(&payload)?;
        let initiator_payload = self.noise.process_message3(&m3)?;
        Ok(initiator_payload)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The peer's long-term Noise static key, available once Transport is
    /// reached. The coordinator must check this against the paired
    /// device's known public key before trusting any payload (spec.md §4.3).
    pub fn remote_static_key(&self) -> Option<[u8; 32]> {
        self.noise.remote_static_key().map(|k| k.to_bytes())
    }

    /// Send an application frame. Transport (non-handshake) frames are
    /// encrypted under the Noise session first.
    pub async fn send(&mut self, message_type: MessageType, plaintext: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(Error::protocol_error("connection not in Connected state"));
        }
        if message_type.is_handshake() {
            return Err(Error::protocol_error("handshake message types cannot be sent post-handshake"));
        }
        let ciphertext = self.noise.encrypt(plaintext)?;
        self.write_raw_frame(message_type, &ciphertext).await
    }

    /// Receive and decrypt the next application frame.
    pub async fn recv(&mut self) -> Result<(MessageType, Vec<u8>)> {
        if self.state != ConnectionState::Connected {
            return Err(Error::protocol_error("connection not in Connected state"));
        }
        let (message_type, ciphertext) = self.read_raw_frame().await?;
        if message_type.is_handshake() {
            return Err(Error::protocol_error("unexpected handshake frame after Transport"));
        }
        let plaintext = self.noise.decrypt(&ciphertext)?;
        Ok((message_type, plaintext))
    }

    pub async fn close(&mut self) -> Result<()> {
        self.state = ConnectionState::Disconnected;
        let _ = self.stream.shutdown().await;
        Ok(())
    }

    async fn write_raw_frame(&mut self, message_type: MessageType, payload: &[u8]) -> Result<()> {
        let frame = Frame::new(message_type, payload.to_vec())?;
        self.stream
            .write_all(&frame.encode())
            .await
            .map_err(|e| Error::io_error(format!("writing frame: {e}")))
    }

    async fn read_raw_frame(&mut self) -> Result<(MessageType, Vec<u8>)> {
        let mut header = [0u8; HEADER_LEN];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| Error::io_error(format!("reading frame header: {e}")))?;
        let (message_type, len) = Frame::decode_header(&header)?;

        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| Error::io_error(format!("reading frame payload: {e}")))?;
        Ok((message_type, payload))
    }
}
