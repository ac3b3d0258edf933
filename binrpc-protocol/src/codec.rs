//! Encoder and decoder for BIN-RPC values and frames.
//!
//! Decoding is a single-pass cursor over an immutable byte slice. It is
//! deliberately lenient: CCU and CUxD devices have been seen cutting frames
//! short of what their own length fields announce, so truncated scalars,
//! strings and doubles come back as best-effort values together with a
//! [`Recovery`] record instead of an error. Only an unknown type tag (or
//! absurd nesting) stops decoding, because there is no way to tell how long
//! the unknown body is.

use crate::double;
use crate::error::ProtocolError;
use crate::frame::{self, Direction, Frame, FRAME_HEADER_SIZE};
use crate::message::{Request, Response};
use crate::value::{
    is_known_tag, Value, TAG_ARRAY, TAG_BOOLEAN, TAG_DOUBLE, TAG_INTEGER, TAG_STRING, TAG_STRUCT,
};
#[cfg(feature = "binary")]
use crate::value::TAG_BINARY;
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;

/// Maximum nesting of arrays and structs accepted on decode.
pub const MAX_DEPTH: usize = 64;

/// Size of a type tag on the wire.
pub const TAG_SIZE: usize = 4;

/// Character set used for string bodies and struct keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1, as configured on some older CCU installations.
    Latin1,
}

impl Charset {
    fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            Charset::Utf8 => Cow::Borrowed(text.as_bytes()),
            Charset::Latin1 => Cow::Owned(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }

    fn decode(&self, raw: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(raw).into_owned(),
            Charset::Latin1 => raw.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Knobs for the decoder. The defaults decode any well-formed payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub charset: Charset,
    /// Accept an array that declares zero elements but is followed by one
    /// more value, as some `system.multicall` senders produce. Only arrays in
    /// tail position (nothing else pending in any enclosing container) are
    /// considered.
    pub multicall_recovery: bool,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_multicall_recovery(mut self, enabled: bool) -> Self {
        self.multicall_recovery = enabled;
        self
    }
}

/// A lenient-decode event: the input was malformed but a value was still produced.
///
/// Offsets are relative to the start of the decoded buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Integer or boolean body shorter than its fixed width; zero-padded.
    ShortScalar {
        tag: u32,
        offset: usize,
        available: usize,
    },
    /// Length field of a string, binary or struct key cut short; zero-padded.
    ShortLength { offset: usize, available: usize },
    /// String or binary body shorter than its declared length.
    ShortBody {
        offset: usize,
        declared: u32,
        available: usize,
    },
    /// Double with fewer than 8 body bytes; decoded as 0.0.
    TruncatedDouble { offset: usize, available: usize },
    /// Array declared empty but followed by one value, which was taken as its element.
    ZeroCountArray { offset: usize },
    /// Array or struct ran out of input before its declared count.
    ContainerTruncated {
        offset: usize,
        declared: u32,
        decoded: usize,
    },
    /// Fewer bytes than a type tag left over at the end of the payload.
    TrailingBytes { offset: usize, len: usize },
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovery::ShortScalar {
                tag,
                offset,
                available,
            } => write!(
                f,
                "short scalar (tag {:#x}) at {}: {} byte(s) present, zero-padded",
                tag, offset, available
            ),
            Recovery::ShortLength { offset, available } => write!(
                f,
                "short length field at {}: {} byte(s) present, zero-padded",
                offset, available
            ),
            Recovery::ShortBody {
                offset,
                declared,
                available,
            } => write!(
                f,
                "short body at {}: declared {} byte(s), {} present",
                offset, declared, available
            ),
            Recovery::TruncatedDouble { offset, available } => write!(
                f,
                "truncated double at {}: {} of 8 byte(s) present, decoded as 0.0",
                offset, available
            ),
            Recovery::ZeroCountArray { offset } => write!(
                f,
                "array at {} declared 0 elements, took the following value as its element",
                offset
            ),
            Recovery::ContainerTruncated {
                offset,
                declared,
                decoded,
            } => write!(
                f,
                "container at {} declared {} element(s), input ended after {}",
                offset, declared, decoded
            ),
            Recovery::TrailingBytes { offset, len } => {
                write!(f, "{} trailing byte(s) at {} ignored", len, offset)
            }
        }
    }
}

/// One decoded value plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub value: Value,
    /// Bytes consumed from the start of the input.
    pub consumed: usize,
    pub recoveries: Vec<Recovery>,
}

/// All top-level values of a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub values: Vec<Value>,
    pub recoveries: Vec<Recovery>,
}

/// A decoded frame: header fields and the values found in its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub direction: Direction,
    pub declared_length: u32,
    /// Payload bytes actually present after the header.
    pub payload_length: usize,
    pub values: Vec<Value>,
    pub recoveries: Vec<Recovery>,
}

impl DecodedFrame {
    /// Returns true if any part of the frame needed lenient recovery.
    pub fn is_recovered(&self) -> bool {
        !self.recoveries.is_empty()
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Appends the wire form of `value` (tag + body) to `buf`, UTF-8 strings.
///
/// Counts and lengths are 4 bytes on the wire and saturate at `u32::MAX`.
/// A value that large cannot be framed: [`encode_frame`] rejects it with
/// [`ProtocolError::FrameTooLarge`].
pub fn encode_value(value: &Value, buf: &mut BytesMut) {
    encode_value_with(value, Charset::Utf8, buf);
}

/// Appends the wire form of `value` to `buf` using `charset` for text.
pub fn encode_value_with(value: &Value, charset: Charset, buf: &mut BytesMut) {
    buf.put_u32(value.tag());
    match value {
        Value::Integer(v) => buf.put_i32(*v),
        Value::Boolean(v) => buf.put_u8(u8::from(*v)),
        Value::Str(v) => put_text(buf, v, charset),
        Value::Double(v) => {
            let (exponent, mantissa) = double::to_wire(*v);
            buf.put_i32(exponent);
            buf.put_i32(mantissa);
        }
        Value::Array(items) => {
            buf.put_u32(wire_len(items.len()));
            for item in items {
                encode_value_with(item, charset, buf);
            }
        }
        Value::Struct(members) => {
            buf.put_u32(wire_len(members.len()));
            for (key, member) in members {
                put_text(buf, key, charset);
                encode_value_with(member, charset, buf);
            }
        }
        #[cfg(feature = "binary")]
        Value::Binary(bytes) => put_raw(buf, bytes),
    }
}

/// Encodes a single value into a fresh buffer.
pub fn encode(value: &Value) -> Bytes {
    let mut buf = BytesMut::new();
    encode_value(value, &mut buf);
    buf.freeze()
}

/// Encodes `values` back-to-back and frames them with an exact length header.
pub fn encode_frame(direction: Direction, values: &[Value]) -> Result<BytesMut, ProtocolError> {
    encode_frame_with(direction, values, Charset::Utf8)
}

/// Like [`encode_frame`], with an explicit charset.
pub fn encode_frame_with(
    direction: Direction,
    values: &[Value],
    charset: Charset,
) -> Result<BytesMut, ProtocolError> {
    let mut payload = BytesMut::new();
    for value in values {
        encode_value_with(value, charset, &mut payload);
    }
    Frame::new(direction, payload.freeze())?.encode()
}

/// Writes a length-prefixed text without a type tag (string bodies, struct keys).
pub(crate) fn put_text(buf: &mut BytesMut, text: &str, charset: Charset) {
    put_raw(buf, &charset.encode(text));
}

fn put_raw(buf: &mut BytesMut, raw: &[u8]) {
    buf.put_u32(wire_len(raw.len()));
    buf.put_slice(raw);
}

/// Length or count as written on the wire, saturating at `u32::MAX`.
pub(crate) fn wire_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

// ============================================================================
// Decoding
// ============================================================================

/// Cursor over an immutable input buffer. Never reads past the end.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    options: DecodeOptions,
    recoveries: Vec<Recovery>,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], options: DecodeOptions) -> Self {
        Self {
            buf,
            pos: 0,
            options,
            recoveries: Vec::new(),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn set_multicall_recovery(&mut self, enabled: bool) {
        self.options.multicall_recovery = enabled;
    }

    pub(crate) fn into_recoveries(self) -> Vec<Recovery> {
        self.recoveries
    }

    pub(crate) fn record(&mut self, recovery: Recovery) {
        tracing::debug!(%recovery, "lenient BIN-RPC decode");
        self.recoveries.push(recovery);
    }

    /// Consumes whatever is left of the input.
    pub(crate) fn skip_rest(&mut self) {
        self.pos = self.buf.len();
    }

    /// Copies up to `N` bytes, zero-filling what the input does not have.
    fn take_padded<const N: usize>(&mut self) -> ([u8; N], usize) {
        let available = self.remaining().min(N);
        let mut out = [0u8; N];
        out[..available].copy_from_slice(&self.buf[self.pos..self.pos + available]);
        self.pos += available;
        (out, available)
    }

    fn peek_u32(&self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> i32 {
        let (bytes, _) = self.take_padded::<4>();
        i32::from_be_bytes(bytes)
    }

    /// Reads a 4-byte count or length field, zero-padding a short one.
    pub(crate) fn read_length(&mut self) -> u32 {
        let offset = self.pos;
        let (bytes, available) = self.take_padded::<4>();
        if available < 4 {
            self.record(Recovery::ShortLength { offset, available });
        }
        u32::from_be_bytes(bytes)
    }

    /// Reads a length-prefixed byte run, clamped to the input.
    pub(crate) fn read_raw(&mut self) -> &'a [u8] {
        let offset = self.pos;
        let declared = self.read_length();
        let available = self.remaining();
        let take = available.min(declared as usize);
        if take < declared as usize {
            self.record(Recovery::ShortBody {
                offset,
                declared,
                available,
            });
        }
        let buf = self.buf;
        let raw = &buf[self.pos..self.pos + take];
        self.pos += take;
        raw
    }

    /// Reads a length-prefixed text without a type tag.
    pub(crate) fn read_text(&mut self) -> String {
        let raw = self.read_raw();
        self.options.charset.decode(raw)
    }

    /// Decodes one tagged value.
    ///
    /// `tail` is true when no enclosing container expects anything after
    /// this value; it gates the zero-count array heuristic.
    pub(crate) fn value(&mut self, depth: usize, tail: bool) -> Result<Value, ProtocolError> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::NestingTooDeep { max: MAX_DEPTH });
        }

        let offset = self.pos;
        let tag = self.peek_u32().ok_or(ProtocolError::MissingValue)?;
        if !is_known_tag(tag) {
            return Err(ProtocolError::UnknownType(tag));
        }
        self.pos += TAG_SIZE;

        let value = match tag {
            TAG_INTEGER => {
                let (bytes, available) = self.take_padded::<4>();
                if available < 4 {
                    self.record(Recovery::ShortScalar {
                        tag,
                        offset,
                        available,
                    });
                }
                Value::Integer(i32::from_be_bytes(bytes))
            }
            TAG_BOOLEAN => {
                let ([byte], available) = self.take_padded::<1>();
                if available < 1 {
                    self.record(Recovery::ShortScalar {
                        tag,
                        offset,
                        available,
                    });
                }
                Value::Boolean(byte != 0)
            }
            TAG_STRING => Value::Str(self.read_text()),
            TAG_DOUBLE => {
                let available = self.remaining();
                if available < double::DOUBLE_WIRE_SIZE {
                    self.record(Recovery::TruncatedDouble { offset, available });
                    self.skip_rest();
                    Value::Double(0.0)
                } else {
                    let exponent = self.read_i32();
                    let mantissa = self.read_i32();
                    Value::Double(double::from_wire(exponent, mantissa))
                }
            }
            TAG_ARRAY => self.array(offset, depth, tail)?,
            TAG_STRUCT => self.structure(offset, depth, tail)?,
            #[cfg(feature = "binary")]
            TAG_BINARY => Value::Binary(self.read_raw().to_vec()),
            other => return Err(ProtocolError::UnknownType(other)),
        };

        Ok(value)
    }

    fn array(&mut self, offset: usize, depth: usize, tail: bool) -> Result<Value, ProtocolError> {
        let declared = self.read_length();

        if declared == 0 {
            if self.options.multicall_recovery && tail {
                if let Some(item) = self.try_adopt_next(depth) {
                    self.record(Recovery::ZeroCountArray { offset });
                    return Ok(Value::Array(vec![item]));
                }
            }
            return Ok(Value::Array(Vec::new()));
        }

        // Every element needs at least a tag, so the input bounds the count.
        let mut items = Vec::with_capacity((declared as usize).min(self.remaining() / TAG_SIZE));
        for i in 0..declared {
            if self.remaining() < TAG_SIZE {
                self.record(Recovery::ContainerTruncated {
                    offset,
                    declared,
                    decoded: items.len(),
                });
                self.skip_rest();
                break;
            }
            let last = i + 1 == declared;
            items.push(self.value(depth + 1, tail && last)?);
        }

        Ok(Value::Array(items))
    }

    fn structure(
        &mut self,
        offset: usize,
        depth: usize,
        tail: bool,
    ) -> Result<Value, ProtocolError> {
        let declared = self.read_length();

        // Key length + value tag.
        let mut members =
            Vec::with_capacity((declared as usize).min(self.remaining() / (2 * TAG_SIZE)));
        for i in 0..declared {
            if self.remaining() < TAG_SIZE {
                self.record(Recovery::ContainerTruncated {
                    offset,
                    declared,
                    decoded: members.len(),
                });
                self.skip_rest();
                break;
            }
            let key = self.read_text();
            if self.remaining() < TAG_SIZE {
                // A key with no value behind it is dropped.
                self.record(Recovery::ContainerTruncated {
                    offset,
                    declared,
                    decoded: members.len(),
                });
                self.skip_rest();
                break;
            }
            let last = i + 1 == declared;
            let member = self.value(depth + 1, tail && last)?;
            members.push((key, member));
        }

        Ok(Value::Struct(members))
    }

    /// Trial-decodes the next value for the zero-count array heuristic.
    ///
    /// The cursor only moves if the value has a known tag and decodes
    /// without any recovery of its own. The trial runs at the array's own
    /// depth, where a plain decode would read the same bytes, and never
    /// adopts recursively. A failed trial leaves the array empty.
    fn try_adopt_next(&mut self, depth: usize) -> Option<Value> {
        match self.peek_u32() {
            Some(tag) if is_known_tag(tag) => {}
            _ => return None,
        }

        let mut trial = Reader {
            buf: self.buf,
            pos: self.pos,
            options: self.options.with_multicall_recovery(false),
            recoveries: Vec::new(),
        };
        match trial.value(depth, true) {
            Ok(item) if trial.recoveries.is_empty() => {
                self.pos = trial.pos;
                Some(item)
            }
            _ => None,
        }
    }
}

/// Decodes one value from the start of `buf`, returning it and the unread rest.
pub fn decode_value(buf: &[u8]) -> Result<(Value, &[u8]), ProtocolError> {
    let decoded = decode_value_with(buf, DecodeOptions::default())?;
    Ok((decoded.value, &buf[decoded.consumed..]))
}

/// Decodes one value from the start of `buf` with explicit options.
pub fn decode_value_with(
    buf: &[u8],
    options: DecodeOptions,
) -> Result<DecodedValue, ProtocolError> {
    let mut reader = Reader::new(buf, options);
    let value = reader.value(0, true)?;
    let consumed = reader.position();
    Ok(DecodedValue {
        value,
        consumed,
        recoveries: reader.into_recoveries(),
    })
}

/// Decodes top-level values back-to-back until the payload is exhausted.
pub fn decode_payload(buf: &[u8]) -> Result<DecodedPayload, ProtocolError> {
    decode_payload_with(buf, DecodeOptions::default())
}

/// Like [`decode_payload`], with explicit options.
pub fn decode_payload_with(
    buf: &[u8],
    options: DecodeOptions,
) -> Result<DecodedPayload, ProtocolError> {
    let mut reader = Reader::new(buf, options);
    let mut values = Vec::new();

    while !reader.is_empty() {
        if reader.remaining() < TAG_SIZE {
            let recovery = Recovery::TrailingBytes {
                offset: reader.position(),
                len: reader.remaining(),
            };
            reader.record(recovery);
            reader.skip_rest();
            break;
        }
        values.push(reader.value(0, true)?);
    }

    Ok(DecodedPayload {
        values,
        recoveries: reader.into_recoveries(),
    })
}

/// Decodes a complete frame: header plus every value in the bytes that follow.
///
/// The header's declared length is reported but not used to cut the payload.
pub fn decode_frame(buf: &[u8]) -> Result<DecodedFrame, ProtocolError> {
    decode_frame_with(buf, DecodeOptions::default())
}

/// Like [`decode_frame`], with explicit options.
pub fn decode_frame_with(
    buf: &[u8],
    options: DecodeOptions,
) -> Result<DecodedFrame, ProtocolError> {
    let header = frame::parse_header(buf)?;
    let payload = &buf[FRAME_HEADER_SIZE..];
    if header.declared_length as usize != payload.len() {
        tracing::debug!(
            declared = header.declared_length,
            actual = payload.len(),
            "frame declared length differs from received payload"
        );
    }

    let decoded = decode_payload_with(payload, options)?;
    Ok(DecodedFrame {
        direction: header.direction,
        declared_length: header.declared_length,
        payload_length: payload.len(),
        values: decoded.values,
        recoveries: decoded.recoveries,
    })
}

// ============================================================================
// Facades
// ============================================================================

/// Encodes messages and values into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a method call into a request frame.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        Frame::new(Direction::Request, request.encode_payload(Charset::Utf8))?.encode()
    }

    /// Encodes a method result or fault into a response frame.
    pub fn encode_response(response: &Response) -> Result<BytesMut, ProtocolError> {
        Frame::new(Direction::Response, response.encode_payload(Charset::Utf8))?.encode()
    }

    /// Encodes plain values into a frame.
    pub fn encode_values(
        direction: Direction,
        values: &[Value],
    ) -> Result<BytesMut, ProtocolError> {
        encode_frame(direction, values)
    }
}

/// Decodes frames into messages and values.
///
/// Holds only its options; every call is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    options: DecodeOptions,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// Decodes a frame into its header fields and payload values.
    pub fn decode_frame(&self, buf: &[u8]) -> Result<DecodedFrame, ProtocolError> {
        decode_frame_with(buf, self.options)
    }

    /// Decodes a request frame into a method call.
    pub fn decode_request(&self, buf: &[u8]) -> Result<Request, ProtocolError> {
        let frame = Frame::decode(buf)?;
        if frame.direction != Direction::Request {
            return Err(ProtocolError::InvalidMessage(
                "expected a request frame".to_string(),
            ));
        }
        Request::decode_payload(&frame.payload, self.options).map(|(request, _)| request)
    }

    /// Decodes a response frame into a result or fault.
    pub fn decode_response(&self, buf: &[u8]) -> Result<Response, ProtocolError> {
        let frame = Frame::decode(buf)?;
        if frame.direction != Direction::Response {
            return Err(ProtocolError::InvalidMessage(
                "expected a response frame".to_string(),
            ));
        }
        Response::decode_payload(&frame.payload, self.options).map(|(response, _)| response)
    }
}
