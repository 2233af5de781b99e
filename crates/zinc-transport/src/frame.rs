//! Wire framing (spec.md §4.4, §6 "Framed message").
//!
//! ```text
//! struct Frame { u8 magic[2]="ZN"; u8 version=1; u8 type;
//!                u32 length; u8 payload[length]; }
//! ```
//!
//! Grounded in `examples/original_source/src/network/transport.hpp`'s frame
//! layout, translated from a `QByteArray`-based encoder to `bytes::BytesMut`.

use zinc_core::error::{Error, Result};

pub const MAGIC: [u8; 2] = *b"ZN";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 2 + 1 + 1 + 4;
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Message type codes from spec.md §4.4's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    NoiseMessage1,
    NoiseMessage2,
    NoiseMessage3,
    PairingRequest,
    PairingResponse,
    PairingComplete,
    PairingReject,
    SyncRequest,
    SyncResponse,
    ChangeNotify,
    ChangeAck,
    Ping,
    Pong,
    Disconnect,
    PagesSnapshot,
    Presence,
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            MessageType::NoiseMessage1 => 0x01,
            MessageType::NoiseMessage2 => 0x02,
            MessageType::NoiseMessage3 => 0x03,
            MessageType::PairingRequest => 0x10,
            MessageType::PairingResponse => 0x11,
            MessageType::PairingComplete => 0x12,
            MessageType::PairingReject => 0x13,
            MessageType::SyncRequest => 0x20,
            MessageType::SyncResponse => 0x21,
            MessageType::ChangeNotify => 0x22,
            MessageType::ChangeAck => 0x23,
            MessageType::Ping => 0x30,
            MessageType::Pong => 0x31,
            MessageType::Disconnect => 0x3F,
            MessageType::PagesSnapshot => 0x40,
            MessageType::Presence => 0x41,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0x01 => MessageType::NoiseMessage1,
            0x02 => MessageType::NoiseMessage2,
            0x03 => MessageType::NoiseMessage3,
            0x10 => MessageType::PairingRequest,
            0x11 => MessageType::PairingResponse,
            0x12 => MessageType::PairingComplete,
            0x13 => MessageType::PairingReject,
            0x20 => MessageType::SyncRequest,
            0x21 => MessageType::SyncResponse,
            0x22 => MessageType::ChangeNotify,
            0x23 => MessageType::ChangeAck,
            0x30 => MessageType::Ping,
            0x31 => MessageType::Pong,
            0x3F => MessageType::Disconnect,
            0x40 => MessageType::PagesSnapshot,
            0x41 => MessageType::Presence,
            other => return Err(Error::protocol_error(format!("unknown frame type {other:#04x}"))),
        })
    }

    /// Handshake messages travel in the clear; everything else is
    /// encrypted under the Noise transport keys once they exist.
    pub fn is_handshake(self) -> bool {
        matches!(self, MessageType::NoiseMessage1 | MessageType::NoiseMessage2 | MessageType::NoiseMessage3)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::protocol_error(format!(
                "frame payload {} bytes exceeds max {MAX_PAYLOAD_LEN}",
                payload.len()
            )));
        }
        Ok(Frame { message_type, payload })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.message_type.code());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a header (the first [`HEADER_LEN`] bytes of a frame), returning
    /// the message type and the payload length still to be read.
    pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<(MessageType, usize)> {
        if header[0..2] != MAGIC {
            return Err(Error::protocol_error(format!("bad frame magic {:?}", &header[0..2])));
        }
        if header[2] != VERSION {
            return Err(Error::protocol_error(format!("unsupported frame version {}", header[2])));
        }
        let message_type = MessageType::from_code(header[3])?;
        let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if length > MAX_PAYLOAD_LEN {
            return Err(Error::protocol_error(format!(
                "frame declares {length} byte payload, exceeds max {MAX_PAYLOAD_LEN}"
            )));
        }
        Ok((message_type, length))
    }
}
