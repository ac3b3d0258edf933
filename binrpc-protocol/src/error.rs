//! Protocol error types.

use thiserror::Error;

/// Structural failures of the BIN-RPC codec.
///
/// Truncated scalars, short strings and the like are not errors; they are
/// absorbed by the decoder and reported as [`Recovery`](crate::codec::Recovery)
/// events instead. Only conditions that leave no safe interpretation of the
/// remaining bytes end up here.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'Bin', got {0:?}")]
    InvalidMagic([u8; 3]),

    #[error("invalid direction byte: {0:#04x}")]
    InvalidDirection(u8),

    #[error("incomplete header: need {needed} more bytes")]
    IncompleteHeader { needed: usize },

    #[error("unknown value type tag: {0:#x}")]
    UnknownType(u32),

    #[error("no value present: buffer too short for a type tag")]
    MissingValue,

    #[error("value nesting exceeds maximum depth of {max}")]
    NestingTooDeep { max: usize },

    #[error("frame too large: {size} bytes (max {max})", max = u32::MAX)]
    FrameTooLarge { size: usize },

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns true if the error concerns the frame header rather than its payload.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidMagic(_)
                | ProtocolError::InvalidDirection(_)
                | ProtocolError::IncompleteHeader { .. }
        )
    }
}
