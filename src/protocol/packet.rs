//! # NIIMBOT Packet Framing
//!
//! Every request and response on the wire is one framed packet:
//!
//! ```text
//! ┌──────┬──────┬─────┬─────┬──────────┬──────────┬──────┬──────┐
//! │ 0x55 │ 0x55 │ cmd │ len │ data ... │ checksum │ 0xAA │ 0xAA │
//! └──────┴──────┴─────┴─────┴──────────┴──────────┴──────┴──────┘
//! ```
//!
//! `checksum = cmd ^ len ^ data[0] ^ ... ^ data[len-1]`
//!
//! Multi-byte integers inside `data` are **big-endian**.
//!
//! ## Example
//!
//! ```
//! use niimbridge::protocol::packet::Packet;
//!
//! let packet = Packet::new(0x21, vec![3]);
//! assert_eq!(packet.to_bytes()?, vec![0x55, 0x55, 0x21, 0x01, 0x03, 0x23, 0xAA, 0xAA]);
//! # Ok::<(), niimbridge::BridgeError>(())
//! ```

use crate::error::BridgeError;

pub const HEAD: [u8; 2] = [0x55, 0x55];
pub const TAIL: [u8; 2] = [0xAA, 0xAA];

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Head + cmd + len + checksum + tail.
pub const FRAME_OVERHEAD: usize = 7;

/// One framed command or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub cmd: u8,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(cmd: u8, data: Vec<u8>) -> Self {
        Self { cmd, data }
    }

    pub fn checksum(&self) -> u8 {
        self.data
            .iter()
            .fold(self.cmd ^ self.data.len() as u8, |acc, b| acc ^ b)
    }

    /// Serialize to wire bytes.
    ///
    /// ## Errors
    ///
    /// [`BridgeError::Protocol`] if the payload exceeds [`MAX_PAYLOAD`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, BridgeError> {
        if self.data.len() > MAX_PAYLOAD {
            return Err(BridgeError::Protocol(format!(
                "payload of {} bytes for 0x{:02X} exceeds {} bytes",
                self.data.len(),
                self.cmd,
                MAX_PAYLOAD
            )));
        }
        let mut out = Vec::with_capacity(self.data.len() + FRAME_OVERHEAD);
        out.extend(HEAD);
        out.push(self.cmd);
        out.push(self.data.len() as u8);
        out.extend(&self.data);
        out.push(self.checksum());
        out.extend(TAIL);
        Ok(out)
    }

    /// Parse exactly one packet.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BridgeError> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(BridgeError::Protocol(format!(
                "packet too short ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[..2] != HEAD || bytes[bytes.len() - 2..] != TAIL {
            return Err(BridgeError::Protocol("bad packet framing".into()));
        }

        let cmd = bytes[2];
        let len = bytes[3] as usize;
        if bytes.len() != len + FRAME_OVERHEAD {
            return Err(BridgeError::Protocol(format!(
                "length mismatch: header says {}, frame holds {}",
                len,
                bytes.len() - FRAME_OVERHEAD
            )));
        }

        let packet = Self::new(cmd, bytes[4..4 + len].to_vec());
        let checksum = bytes[4 + len];
        if packet.checksum() != checksum {
            return Err(BridgeError::Protocol(format!(
                "checksum mismatch for 0x{:02X}: expected 0x{:02X}, got 0x{:02X}",
                cmd,
                packet.checksum(),
                checksum
            )));
        }
        Ok(packet)
    }
}

/// Accumulates received bytes and yields complete packets.
///
/// Garbage before a packet head is skipped.
#[derive(Debug, Default)]
pub struct PacketReader {
    buf: Vec<u8>,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete packet, if one has been fully received.
    pub fn next_packet(&mut self) -> Option<Result<Packet, BridgeError>> {
        loop {
            let start = self.buf.windows(2).position(|w| w == HEAD)?;
            self.buf.drain(..start);
            if self.buf.len() < 4 {
                return None;
            }
            let total = self.buf[3] as usize + FRAME_OVERHEAD;
            if self.buf.len() < total {
                return None;
            }
            let frame: Vec<u8> = self.buf.drain(..total).collect();
            match Packet::from_bytes(&frame) {
                Ok(packet) => return Some(Ok(packet)),
                // Misaligned head inside data; resync one byte later
                Err(_) if frame[total - 2..] != TAIL => {
                    self.buf.splice(0..0, frame[1..].iter().copied());
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
