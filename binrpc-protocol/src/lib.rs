//! # binrpc-protocol
//!
//! Wire codec for BIN-RPC, the binary RPC format spoken by HomeMatic CCU and
//! CUxD controllers.
//!
//! This crate provides:
//! - Frame header recognition and construction (`"Bin"` + direction + length)
//! - Value encoding/decoding with lenient recovery for truncated input
//! - Exponent-first double encoding as emitted by CCU firmware
//! - Request/Response/Fault message types and `system.multicall` helpers
//!
//! The codec is stateless: no sockets, no buffering across calls.

pub mod codec;
pub mod double;
pub mod error;
pub mod frame;
pub mod json;
pub mod message;
pub mod value;

pub use codec::{
    decode_frame, decode_frame_with, decode_payload, decode_payload_with, decode_value,
    decode_value_with, encode, encode_frame, encode_frame_with, encode_value, encode_value_with,
    Charset, DecodeOptions, DecodedFrame, DecodedPayload, DecodedValue, Decoder, Encoder,
    Recovery, MAX_DEPTH,
};
pub use error::ProtocolError;
pub use frame::{build_header, parse_header, Direction, Frame, Header, FRAME_HEADER_SIZE, MAGIC};
pub use message::{Fault, MulticallCall, Request, Response, MULTICALL_METHOD};
pub use value::Value;

