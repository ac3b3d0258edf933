//! BIN-RPC frame layer.
//!
//! Frame layout (8 bytes header + payload):
//!
//! ```text
//! +---------+-----------+-----------------+
//! | magic   | direction | declared_length |
//! | "Bin"   | 1 byte    | 4 bytes (BE)    |
//! +---------+-----------+-----------------+
//! | payload                               |
//! | declared_length bytes (nominally)     |
//! +---------------------------------------+
//! ```
//!
//! The declared length is exact on encode and advisory on decode: some CUxD
//! builds under-report it, so a parsed frame always carries every byte that
//! follows the header.

use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Magic bytes opening every frame: "Bin"
pub const MAGIC: [u8; 3] = *b"Bin";

/// Size of the frame header in bytes (3+1+4 = 8).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Whether a frame carries a method call or its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Request = 0x00,
    Response = 0x01,
}

impl TryFrom<u8> for Direction {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Direction::Request),
            0x01 => Ok(Direction::Response),
            other => Err(ProtocolError::InvalidDirection(other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => write!(f, "request"),
            Direction::Response => write!(f, "response"),
        }
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub direction: Direction,
    /// Payload length as claimed by the sender.
    pub declared_length: u32,
}

/// Parses the 8-byte frame header at the start of `buf`.
///
/// Never looks past offset 8, so it can be called on a partially received frame.
pub fn parse_header(buf: &[u8]) -> Result<Header, ProtocolError> {
    if buf.len() < FRAME_HEADER_SIZE {
        if buf.len() >= MAGIC.len() && buf[..MAGIC.len()] != MAGIC {
            return Err(ProtocolError::InvalidMagic([buf[0], buf[1], buf[2]]));
        }
        return Err(ProtocolError::IncompleteHeader {
            needed: FRAME_HEADER_SIZE - buf.len(),
        });
    }

    let magic = [buf[0], buf[1], buf[2]];
    if magic != MAGIC {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let direction = Direction::try_from(buf[3])?;
    let declared_length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

    Ok(Header {
        direction,
        declared_length,
    })
}

/// Builds the 8-byte header for a payload of `payload_len` bytes.
pub fn build_header(direction: Direction, payload_len: u32) -> [u8; FRAME_HEADER_SIZE] {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[..3].copy_from_slice(&MAGIC);
    header[3] = direction as u8;
    header[4..].copy_from_slice(&payload_len.to_be_bytes());
    header
}

/// A BIN-RPC frame: header fields plus the raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub direction: Direction,
    /// Length from the header. Equals `payload.len()` for frames built here,
    /// may differ for frames received from devices.
    pub declared_length: u32,
    /// Every byte after the header.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a frame whose declared length matches the payload.
    pub fn new(direction: Direction, payload: Bytes) -> Result<Self, ProtocolError> {
        let declared_length = u32::try_from(payload.len())
            .map_err(|_| ProtocolError::FrameTooLarge {
                size: payload.len(),
            })?;
        Ok(Self {
            direction,
            declared_length,
            payload,
        })
    }

    /// Encodes the frame into bytes.
    ///
    /// The header always declares the true payload length, whatever
    /// `declared_length` holds.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let payload_len =
            u32::try_from(self.payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
                size: self.payload.len(),
            })?;

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.put_slice(&build_header(self.direction, payload_len));
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a complete frame from `buf`.
    ///
    /// The payload is everything after the header. A declared length that
    /// disagrees with it is logged, not rejected.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let header = parse_header(buf)?;
        let payload = Bytes::copy_from_slice(&buf[FRAME_HEADER_SIZE..]);

        if header.declared_length as usize != payload.len() {
            tracing::debug!(
                declared = header.declared_length,
                actual = payload.len(),
                "frame declared length differs from received payload"
            );
        }

        Ok(Self {
            direction: header.direction,
            declared_length: header.declared_length,
            payload,
        })
    }

    /// Returns `(declared, actual)` if the header lied about the payload length.
    pub fn length_mismatch(&self) -> Option<(u32, usize)> {
        (self.declared_length as usize != self.payload.len())
            .then_some((self.declared_length, self.payload.len()))
    }
}
