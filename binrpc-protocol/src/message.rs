//! BIN-RPC method calls, results and faults.
//!
//! A request payload is not a plain value sequence: the method name is a
//! raw length-prefixed string without a type tag, followed by a 4-byte
//! parameter count and that many tagged values. A response payload is a
//! single tagged value, optionally preceded by a zero status word.

use crate::codec::{self, Charset, DecodeOptions, Reader, Recovery, TAG_SIZE};
use crate::error::ProtocolError;
use crate::value::{is_known_tag, Value};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Method name of a batched call.
pub const MULTICALL_METHOD: &str = "system.multicall";

/// Struct key holding a fault's numeric code.
pub const FAULT_CODE_KEY: &str = "faultCode";

/// Struct key holding a fault's description.
pub const FAULT_STRING_KEY: &str = "faultString";

/// A method call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Builds a `system.multicall` request batching `calls`.
    pub fn multicall(calls: &[MulticallCall]) -> Self {
        let calls = calls.iter().map(MulticallCall::to_value).collect();
        Self::new(MULTICALL_METHOD, vec![Value::Array(calls)])
    }

    pub fn is_multicall(&self) -> bool {
        self.method == MULTICALL_METHOD
    }

    /// Unpacks the calls batched in a `system.multicall` request.
    pub fn multicall_calls(&self) -> Result<Vec<MulticallCall>, ProtocolError> {
        if !self.is_multicall() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} is not {}",
                self.method, MULTICALL_METHOD
            )));
        }
        let calls = self
            .params
            .first()
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage("multicall expects an array of calls".to_string())
            })?;
        calls.iter().map(MulticallCall::from_value).collect()
    }

    /// Encodes the request payload (without frame header).
    pub fn encode_payload(&self, charset: Charset) -> Bytes {
        let mut buf = BytesMut::new();
        codec::put_text(&mut buf, &self.method, charset);
        buf.put_u32(codec::wire_len(self.params.len()));
        for param in &self.params {
            codec::encode_value_with(param, charset, &mut buf);
        }
        buf.freeze()
    }

    /// Decodes a request payload.
    ///
    /// For `system.multicall` the zero-count array heuristic is switched on
    /// regardless of `options`.
    pub fn decode_payload(
        buf: &[u8],
        options: DecodeOptions,
    ) -> Result<(Self, Vec<Recovery>), ProtocolError> {
        let mut reader = Reader::new(buf, options);
        if reader.remaining() < TAG_SIZE {
            return Err(ProtocolError::InvalidMessage(
                "request payload has no method name".to_string(),
            ));
        }

        let method = reader.read_text();
        if method == MULTICALL_METHOD {
            reader.set_multicall_recovery(true);
        }

        let declared = if reader.is_empty() {
            0
        } else {
            reader.read_length()
        };

        let params_offset = reader.position();
        let mut params = Vec::with_capacity((declared as usize).min(reader.remaining() / TAG_SIZE));
        for i in 0..declared {
            if reader.remaining() < TAG_SIZE {
                let recovery = Recovery::ContainerTruncated {
                    offset: params_offset,
                    declared,
                    decoded: params.len(),
                };
                reader.record(recovery);
                reader.skip_rest();
                break;
            }
            params.push(reader.value(0, i + 1 == declared)?);
        }

        record_trailing(&mut reader);
        Ok((Self { method, params }, reader.into_recoveries()))
    }
}

/// A method result or fault.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Value),
    Fault(Fault),
}

impl Response {
    pub fn success(value: impl Into<Value>) -> Self {
        Response::Success(value.into())
    }

    /// Result of a method that returns nothing (encoded as an empty string).
    pub fn empty() -> Self {
        Response::Success(Value::Str(String::new()))
    }

    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        Response::Fault(Fault::new(code, message))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Response::Fault(_))
    }

    /// Converts into a plain `Result`.
    pub fn into_result(self) -> Result<Value, Fault> {
        match self {
            Response::Success(value) => Ok(value),
            Response::Fault(fault) => Err(fault),
        }
    }

    /// Builds the response to a `system.multicall`.
    ///
    /// Successful results are wrapped in a one-element array, failures are
    /// fault structs, following the XML-RPC multicall convention.
    pub fn multicall(results: Vec<Result<Value, Fault>>) -> Self {
        let items = results
            .into_iter()
            .map(|result| match result {
                Ok(value) => Value::Array(vec![value]),
                Err(fault) => fault.to_value(),
            })
            .collect();
        Response::Success(Value::Array(items))
    }

    /// Splits a `system.multicall` response into per-call results.
    ///
    /// Results not wrapped in an array are taken as they are.
    pub fn multicall_results(&self) -> Result<Vec<Result<Value, Fault>>, ProtocolError> {
        let items = match self {
            Response::Success(Value::Array(items)) => items,
            Response::Success(other) => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "multicall response is {}, expected array",
                    other.type_name()
                )))
            }
            Response::Fault(fault) => return Ok(vec![Err(fault.clone())]),
        };

        Ok(items
            .iter()
            .map(|item| match item {
                Value::Array(wrapped) if wrapped.len() == 1 => Ok(wrapped[0].clone()),
                other => match Fault::from_value(other) {
                    Some(fault) => Err(fault),
                    None => Ok(other.clone()),
                },
            })
            .collect())
    }

    /// Encodes the response payload (without frame header).
    pub fn encode_payload(&self, charset: Charset) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Response::Success(value) => codec::encode_value_with(value, charset, &mut buf),
            Response::Fault(fault) => codec::encode_value_with(&fault.to_value(), charset, &mut buf),
        }
        buf.freeze()
    }

    /// Decodes a response payload. An empty payload is an empty result.
    ///
    /// Some peers put a zero status word in front of the value; it is
    /// skipped when a known type tag (or nothing) follows it.
    pub fn decode_payload(
        buf: &[u8],
        options: DecodeOptions,
    ) -> Result<(Self, Vec<Recovery>), ProtocolError> {
        let mut reader = Reader::new(buf, options);
        if has_status_word(buf) {
            tracing::debug!("skipping response status word");
            let _status = reader.read_length();
        }
        if reader.is_empty() {
            return Ok((Response::empty(), Vec::new()));
        }

        let value = reader.value(0, true)?;
        record_trailing(&mut reader);

        let response = match Fault::from_value(&value) {
            Some(fault) => Response::Fault(fault),
            None => Response::Success(value),
        };
        Ok((response, reader.into_recoveries()))
    }
}

/// An error reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::structure([
            (FAULT_CODE_KEY, Value::Integer(self.code)),
            (FAULT_STRING_KEY, Value::Str(self.message.clone())),
        ])
    }

    /// Recognizes a `{faultCode, faultString}` struct.
    pub fn from_value(value: &Value) -> Option<Self> {
        let members = value.as_struct()?;
        if members.len() != 2 {
            return None;
        }
        let code = value.get(FAULT_CODE_KEY)?.as_i32()?;
        let message = value.get(FAULT_STRING_KEY)?.as_str()?;
        Some(Self::new(code, message))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

/// One call inside a `system.multicall` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MulticallCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

impl MulticallCall {
    pub fn new(method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            params,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::structure([
            ("methodName", Value::Str(self.method_name.clone())),
            ("params", Value::Array(self.params.clone())),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let method_name = value
            .get("methodName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage("multicall entry without methodName".to_string())
            })?;
        let params = match value.get("params") {
            Some(Value::Array(params)) => params.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };
        Ok(Self::new(method_name, params))
    }
}

fn has_status_word(buf: &[u8]) -> bool {
    match buf {
        [0, 0, 0, 0] => true,
        [0, 0, 0, 0, a, b, c, d, ..] => is_known_tag(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => false,
    }
}

fn record_trailing(reader: &mut Reader<'_>) {
    if !reader.is_empty() {
        let recovery = Recovery::TrailingBytes {
            offset: reader.position(),
            len: reader.remaining(),
        };
        reader.record(recovery);
        reader.skip_rest();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, Encoder};
    use crate::frame::{Direction, Frame};

    #[test]
    fn test_request_payload_layout() {
        let request = Request::new("init", vec![Value::from("xmlrpc_bin://127.0.0.1:19126")]);
        let payload = request.encode_payload(Charset::Utf8);

        // Raw method name, no type tag.
        assert_eq!(&payload[..8], b"\x00\x00\x00\x04init");
        // Parameter count.
        assert_eq!(&payload[8..12], b"\x00\x00\x00\x01");
        // First parameter is a tagged string.
        assert_eq!(&payload[12..16], b"\x00\x00\x00\x03");
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Request::new(
            "setValue",
            vec![
                Value::from("CUX2801001:1"),
                Value::from("STATE"),
                Value::Boolean(true),
            ],
        );
        let encoded = Encoder::encode_request(&request).unwrap();
        let decoded = Decoder::new().decode_request(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_without_params() {
        let request = Request::new("listDevices", vec![]);
        let (decoded, recoveries) =
            Request::decode_payload(&request.encode_payload(Charset::Utf8), DecodeOptions::new())
                .unwrap();
        assert_eq!(decoded, request);
        assert!(recoveries.is_empty());

        // Count missing entirely.
        let (decoded, _) =
            Request::decode_payload(b"\x00\x00\x00\x04ping", DecodeOptions::new()).unwrap();
        assert_eq!(decoded, Request::new("ping", vec![]));
    }

    #[test]
    fn test_request_empty_payload_is_invalid() {
        assert!(matches!(
            Request::decode_payload(b"", DecodeOptions::new()),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_event_with_underreported_length() {
        let request = Request::new(
            "event",
            vec![
                Value::from("iface"),
                Value::from("CUX3900001:1"),
                Value::from("STATE"),
                Value::Boolean(true),
            ],
        );
        let mut buf = Encoder::encode_request(&request).unwrap().to_vec();
        let declared = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        buf[4..8].copy_from_slice(&(declared - 3).to_be_bytes());

        let frame = Frame::decode(&buf).unwrap();
        assert_eq!(frame.direction, Direction::Request);
        let decoded = Decoder::new().decode_request(&buf).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_truncated_params() {
        let request = Request::new("event", vec![Value::from("iface"), Value::Double(21.5)]);
        let payload = request.encode_payload(Charset::Utf8);
        // Cut the double after its exponent.
        let cut = &payload[..payload.len() - 4];

        let (decoded, recoveries) = Request::decode_payload(cut, DecodeOptions::new()).unwrap();
        assert_eq!(decoded.params, vec![Value::from("iface"), Value::Double(0.0)]);
        assert!(matches!(
            recoveries[..],
            [Recovery::TruncatedDouble { available: 4, .. }]
        ));
    }

    #[test]
    fn test_multicall_roundtrip() {
        let calls = vec![
            MulticallCall::new(
                "setValue",
                vec![Value::from("CUX2801002:1"), Value::from("STATE"), Value::Integer(42)],
            ),
            MulticallCall::new(
                "getValue",
                vec![Value::from("CUX2801002:1"), Value::from("STATE")],
            ),
        ];
        let request = Request::multicall(&calls);
        assert!(request.is_multicall());

        let encoded = Encoder::encode_request(&request).unwrap();
        let decoded = Decoder::new().decode_request(&encoded).unwrap();
        assert_eq!(decoded.multicall_calls().unwrap(), calls);
    }

    #[test]
    fn test_multicall_with_zero_declared_calls() {
        let call = MulticallCall::new("getValue", vec![Value::from("A:1"), Value::from("STATE")]);

        let mut buf = BytesMut::new();
        codec::put_text(&mut buf, MULTICALL_METHOD, Charset::Utf8);
        buf.put_u32(1);
        // Array claiming zero calls, followed by the call itself.
        buf.put_u32(0x100);
        buf.put_u32(0);
        codec::encode_value(&call.to_value(), &mut buf);

        let (request, recoveries) = Request::decode_payload(&buf, DecodeOptions::new()).unwrap();
        assert_eq!(request.multicall_calls().unwrap(), vec![call]);
        assert!(matches!(
            recoveries[..],
            [Recovery::ZeroCountArray { .. }]
        ));
    }

    #[test]
    fn test_multicall_calls_requires_multicall() {
        let request = Request::new("getValue", vec![]);
        assert!(request.multicall_calls().is_err());

        let request = Request::new(MULTICALL_METHOD, vec![Value::Integer(1)]);
        assert!(request.multicall_calls().is_err());
    }

    #[test]
    fn test_response_roundtrip() {
        let response = Response::success(Value::from("OK"));
        let encoded = Encoder::encode_response(&response).unwrap();
        assert_eq!(&encoded[..4], b"Bin\x01");
        assert_eq!(Decoder::new().decode_response(&encoded).unwrap(), response);
    }

    #[test]
    fn test_empty_response() {
        let (response, _) = Response::decode_payload(b"", DecodeOptions::new()).unwrap();
        assert_eq!(response, Response::empty());

        let payload = Response::empty().encode_payload(Charset::Utf8);
        assert_eq!(payload.as_ref(), b"\x00\x00\x00\x03\x00\x00\x00\x00");
    }

    #[test]
    fn test_response_with_status_word() {
        // Status word 0, then a tagged "OK"; the length field counts the header too.
        let frame = b"Bin\x01\x00\x00\x00\x16\x00\x00\x00\x00\x00\x00\x00\x03\x00\x00\x00\x02OK";
        let response = Decoder::new().decode_response(frame).unwrap();
        assert_eq!(response, Response::success("OK"));

        let (response, recoveries) =
            Response::decode_payload(&[0, 0, 0, 0], DecodeOptions::new()).unwrap();
        assert_eq!(response, Response::empty());
        assert!(recoveries.is_empty());
    }

    #[test]
    fn test_response_encodes_without_status_word() {
        let payload = Response::success(Value::Integer(1)).encode_payload(Charset::Utf8);
        assert_eq!(payload.as_ref(), b"\x00\x00\x00\x01\x00\x00\x00\x01");
    }

    #[test]
    fn test_zero_word_before_unknown_tag_is_not_skipped() {
        let payload = b"\x00\x00\x00\x00\x00\x00\x00\xff";
        assert!(matches!(
            Response::decode_payload(payload, DecodeOptions::new()),
            Err(ProtocolError::UnknownType(0))
        ));
    }

    #[test]
    fn test_fault_roundtrip() {
        let response = Response::fault(-2, "Unknown instance");
        let encoded = Encoder::encode_response(&response).unwrap();
        let decoded = Decoder::new().decode_response(&encoded).unwrap();
        assert!(decoded.is_fault());
        assert_eq!(
            decoded.into_result(),
            Err(Fault::new(-2, "Unknown instance"))
        );
    }

    #[test]
    fn test_struct_with_extra_members_is_not_a_fault() {
        let value = Value::structure([
            (FAULT_CODE_KEY, Value::Integer(1)),
            (FAULT_STRING_KEY, Value::from("x")),
            ("OTHER", Value::Boolean(true)),
        ]);
        assert!(Fault::from_value(&value).is_none());
    }

    #[test]
    fn test_multicall_results() {
        let response = Response::multicall(vec![
            Ok(Value::from("")),
            Ok(Value::Integer(42)),
            Err(Fault::new(-5, "Unknown parameter")),
        ]);
        let encoded = Encoder::encode_response(&response).unwrap();
        let decoded = Decoder::new().decode_response(&encoded).unwrap();

        let results = decoded.multicall_results().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1], Ok(Value::Integer(42)));
        assert_eq!(results[2], Err(Fault::new(-5, "Unknown parameter")));
    }

    #[test]
    fn test_multicall_results_unwrapped() {
        let response = Response::success(Value::Array(vec![Value::Integer(1), Value::from("x")]));
        let results = response.multicall_results().unwrap();
        assert_eq!(results, vec![Ok(Value::Integer(1)), Ok(Value::from("x"))]);

        assert!(Response::success(Value::Integer(1)).multicall_results().is_err());
    }

    #[test]
    fn test_multicall_call_from_value() {
        let value = Value::structure([
            ("methodName", Value::from("ping")),
            ("params", Value::from("solo")),
        ]);
        let call = MulticallCall::from_value(&value).unwrap();
        assert_eq!(call.params, vec![Value::from("solo")]);

        assert!(MulticallCall::from_value(&Value::Struct(vec![])).is_err());
    }
}
